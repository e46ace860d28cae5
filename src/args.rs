use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use facetrack::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Classroom attendance by live face recognition", long_about = None)]
pub struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, global = true, default_value = AppConfig::DEFAULT_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run live recognition and log attendance
    Run {
        /// Don't open a preview window
        #[arg(long, default_value_t = false)]
        headless: bool,

        /// Stop after this many processed frames
        #[arg(long)]
        frames: Option<u64>,

        /// Write the last annotated frame to this JPEG file on exit
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Rebuild the gallery from the dataset
    Train,
    /// Check dataset images without training
    Validate,
    /// Register a student from sample photos and retrain
    AddPerson {
        #[arg(short, long)]
        name: String,

        /// Sample photos of the student
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Delete a student's photos and retrain
    RemovePerson {
        #[arg(short, long)]
        name: String,
    },
    /// List registered students
    Students,
    /// Today's attendance summary
    Stats,
    /// Attendance counts for the last seven days
    Weekly,
    /// Attendance over a date range (default: last 30 days)
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Drop attendance rows older than N days (backup kept)
    Cleanup {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show gallery, dataset and log status
    Status,
    /// List available cameras
    ListCameras,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let args = Args::parse_from(["facetrack", "run", "--headless", "--frames", "10"]);
        assert_eq!(args.config, PathBuf::from("facetrack.json"));
        assert!(matches!(
            args.command,
            Command::Run { headless: true, frames: Some(10), snapshot: None }
        ));

        let args = Args::parse_from([
            "facetrack", "--config", "alt.json", "add-person", "--name", "Ada Lovelace", "a.jpg", "b.jpg",
        ]);
        assert_eq!(args.config, PathBuf::from("alt.json"));
        match args.command {
            Command::AddPerson { name, images } => {
                assert_eq!(name, "Ada Lovelace");
                assert_eq!(images.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let args = Args::parse_from(["facetrack", "report", "--from", "2024-05-01"]);
        assert!(matches!(args.command, Command::Report { from: Some(_), to: None }));
    }
}
