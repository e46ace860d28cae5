use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use colored::*;
use env_logger::Env;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

mod args;

use args::{Args, Command};
use facetrack::analyzer::OnnxFaceAnalyzer;
use facetrack::attendance::{AttendanceLog, AttendanceLogger};
use facetrack::camera::{self, CameraSource};
use facetrack::config::AppConfig;
use facetrack::dataset;
use facetrack::gallery::Gallery;
use facetrack::output::WindowOutput;
use facetrack::overlay::Overlay;
use facetrack::pipeline::{encode_jpeg, PipelineDriver};
use facetrack::recognizer::FrameRecognizer;
use facetrack::report::{weekly_attendance, AttendanceReport, AttendanceStats, SystemStatus};
use facetrack::trainer::{GalleryTrainer, TrainSummary};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Command::ListCameras = args.command {
        return list_cameras();
    }

    let config = AppConfig::load(&args.config)?;
    config.validate()?;
    config.ensure_directories()?;

    match args.command {
        Command::Run {
            headless,
            frames,
            snapshot,
        } => run(&config, headless, frames, snapshot.as_deref()),
        Command::Train => {
            let summary = trainer(&config)?.train()?;
            print_summary("Training completed", &summary);
            Ok(())
        }
        Command::Validate => validate(&config),
        Command::AddPerson { name, images } => {
            let summary = trainer(&config)?.add_person(&name, &images)?;
            print_summary(&format!("Added {}", name), &summary);
            Ok(())
        }
        Command::RemovePerson { name } => {
            let summary = trainer(&config)?.remove_person(&name)?;
            print_summary(&format!("Removed {}", name), &summary);
            Ok(())
        }
        Command::Students => students(&config),
        Command::Stats => stats(&config),
        Command::Weekly => weekly(&config),
        Command::Report { from, to } => report(&config, from, to),
        Command::Cleanup { days } => {
            let days = days.unwrap_or(config.attendance.retention_days);
            let log = AttendanceLog::new(&config.paths.attendance);
            let outcome = log.cleanup(Local::now().date_naive(), days)?;
            match outcome.backup {
                Some(backup) => println!(
                    "{}",
                    format!(
                        "Removed {} records older than {} days ({} kept). Backup: {}",
                        outcome.removed,
                        days,
                        outcome.kept,
                        backup.display()
                    )
                    .green()
                ),
                None => println!("No records older than {} days.", days),
            }
            Ok(())
        }
        Command::Status => status(&config),
        Command::ListCameras => list_cameras(),
    }
}

fn run(config: &AppConfig, headless: bool, max_frames: Option<u64>, snapshot: Option<&Path>) -> Result<()> {
    let analyzer = OnnxFaceAnalyzer::new(&config.models)?;
    let gallery = Gallery::load_or_empty(&config.paths.gallery);
    println!("Known faces: {}", gallery.len());

    let recognizer = FrameRecognizer::new(
        Box::new(analyzer),
        gallery,
        config.recognition,
        Overlay::new(&config.overlay),
    );
    println!("Active Recognizer: {}", recognizer.name());

    let camera = CameraSource::open(&config.camera)?;
    let logger = AttendanceLogger::new(AttendanceLog::new(&config.paths.attendance));
    let mut driver = PipelineDriver::new(camera, recognizer, logger);

    let mut window = if headless {
        None
    } else {
        let w = WindowOutput::new(
            &config.overlay.title,
            config.camera.width as usize,
            config.camera.height as usize,
        )?;
        println!("Controls: [R] Reload gallery [Esc] Quit");
        Some(w)
    };

    let poll = Duration::from_millis(config.camera.poll_interval_ms);
    let mut processed = 0u64;
    let mut last_frame = None;

    loop {
        if let Some(w) = &window {
            if !w.is_open() || w.is_key_down(minifb::Key::Escape) {
                break;
            }
            if w.is_key_pressed(minifb::Key::R) {
                driver.reload_gallery(&config.paths.gallery);
            }
        }
        if max_frames.is_some_and(|n| processed >= n) {
            break;
        }

        match driver.step_now() {
            Some(result) => {
                processed += 1;
                for name in &result.logged {
                    println!(
                        "{}",
                        format!("Attendance logged for {} at {}", name, Local::now().format("%H:%M:%S")).green()
                    );
                }
                if let Some(w) = window.as_mut() {
                    w.show(&result.frame)?;
                }
                last_frame = Some(result.frame);
            }
            None => {
                if let Some(w) = window.as_mut() {
                    w.idle();
                }
            }
        }

        if window.is_none() {
            thread::sleep(poll);
        }
    }

    driver.stop();
    println!("Processed {} frames.", processed);

    if let (Some(path), Some(frame)) = (snapshot, last_frame) {
        let bytes = encode_jpeg(&frame, config.output.jpeg_quality)?;
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Snapshot saved to {}", path.display());
    }
    Ok(())
}

fn trainer(config: &AppConfig) -> Result<GalleryTrainer> {
    let analyzer = OnnxFaceAnalyzer::new(&config.models)?;
    Ok(GalleryTrainer::new(
        Box::new(analyzer),
        &config.paths.dataset,
        &config.paths.gallery,
    ))
}

fn print_summary(title: &str, summary: &TrainSummary) {
    println!("{}", title.green().bold());
    println!("  People:         {}", summary.people);
    println!("  Encodings:      {}", summary.encodings);
    if summary.skipped_images > 0 {
        println!("  {}", format!("Skipped images: {}", summary.skipped_images).yellow());
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    let report = trainer(config)?.validate()?;
    if report.people.is_empty() {
        println!("{}", "No students registered.".yellow());
        return Ok(());
    }
    for person in &report.people {
        let line = format!("{}: {}/{} valid images", person.name, person.valid_images, person.total_images);
        if person.issues.is_empty() {
            println!("{}", line.green());
        } else {
            println!("{}", line.yellow());
            for issue in &person.issues {
                println!("    - {}", issue);
            }
        }
    }
    println!("Total: {}/{} valid images", report.valid_images(), report.total_images());
    Ok(())
}

fn students(config: &AppConfig) -> Result<()> {
    let students = dataset::list_students(&config.paths.dataset)?;
    println!("{:<30} | {:<30} | {:<6}", "Name", "Folder", "Images");
    println!("{}", "-".repeat(72));
    for s in &students {
        println!("{:<30} | {:<30} | {:<6}", s.name, s.folder, s.images);
    }
    println!("{} students registered.", students.len());
    Ok(())
}

fn stats(config: &AppConfig) -> Result<()> {
    let records = AttendanceLog::new(&config.paths.attendance).read_all()?;
    let total = dataset::person_dirs(&config.paths.dataset)?.len();
    let today = Local::now().date_naive();
    let stats = AttendanceStats::compute(&records, total, today, config.attendance.late_after);

    println!("{}", format!("Attendance for {}", today).bold());
    println!("  Students:  {}", stats.total_students);
    println!("  Present:   {}", stats.present_today.to_string().green());
    println!("  Absent:    {}", stats.absent_today.to_string().red());
    println!("  Late:      {}", stats.late_today.to_string().yellow());
    println!("  Rate:      {:.1}%", stats.attendance_rate);

    if !stats.recent_records.is_empty() {
        println!("Recent:");
        for r in &stats.recent_records {
            println!("  {} {} {}", r.date, r.time, r.name);
        }
    }
    Ok(())
}

fn weekly(config: &AppConfig) -> Result<()> {
    let records = AttendanceLog::new(&config.paths.attendance).read_all()?;
    for (day, count) in weekly_attendance(&records, Local::now().date_naive()) {
        println!("{} {:<3} {}", day.format("%a %Y-%m-%d"), count, "#".repeat(count));
    }
    Ok(())
}

fn report(config: &AppConfig, from: Option<chrono::NaiveDate>, to: Option<chrono::NaiveDate>) -> Result<()> {
    let records = AttendanceLog::new(&config.paths.attendance).read_all()?;
    let (default_start, default_end) = AttendanceReport::default_range(Local::now().date_naive());
    let report = AttendanceReport::export(&records, from.unwrap_or(default_start), to.unwrap_or(default_end));

    println!("{}", format!("Attendance {} to {}", report.start, report.end).bold());
    println!("  Records:         {}", report.total_records);
    println!("  Unique students: {}", report.unique_students);
    println!("Per day:");
    for (day, count) in &report.daily {
        println!("  {}  {}", day, count);
    }
    println!("Per student:");
    for (name, count) in &report.per_student {
        println!("  {:<30} {}", name, count);
    }
    Ok(())
}

fn status(config: &AppConfig) -> Result<()> {
    let status = SystemStatus::gather(config)?;
    let trained = if status.gallery_trained {
        "yes".green()
    } else {
        "no".red()
    };
    println!("Model trained:      {}", trained);
    if let Some(t) = status.last_training {
        println!("Last training:      {}", t.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("Students:           {}", status.registered_students);
    println!("Dataset images:     {}", status.dataset_images);
    println!("Attendance records: {}", status.attendance_records);
    Ok(())
}

fn list_cameras() -> Result<()> {
    let cameras = camera::list_cameras()?;
    println!("Available Cameras:");
    println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
    println!("{}", "-".repeat(60));
    for cam in cameras {
        println!("{:<5} | {:<30} | {}", cam.index, cam.name, cam.misc);
    }
    Ok(())
}
