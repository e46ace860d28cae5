use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::attendance::AttendanceLog;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub recognition: RecognitionConfig,
    pub models: ModelConfig,
    pub paths: PathsConfig,
    pub attendance: AttendanceConfig,
    pub overlay: OverlayConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Run detection on every Nth frame.
    pub cadence: u32,
    /// Maximum embedding distance accepted as a match. The default suits
    /// 128-d dlib-style embeddings; L2-normalised ArcFace vectors put
    /// same-person pairs much further apart, so recalibrate this for the
    /// encoder model in use.
    pub tolerance: f32,
    /// Linear scale applied to frames before detection.
    pub downscale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub detector: PathBuf,
    pub encoder: PathBuf,
    pub detector_score: f32,
    pub nms_iou: f32,
    pub encoder_input: u32,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub dataset: PathBuf,
    pub gallery: PathBuf,
    pub attendance: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Arrivals strictly after this time count as late.
    pub late_after: NaiveTime,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub title: String,
    pub font_family: String,
    pub font_size_pt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
            poll_interval_ms: 33,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            cadence: 3,
            tolerance: 0.5,
            downscale: 0.25,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("models/face_detection.onnx"),
            encoder: PathBuf::from("models/face_embedding.onnx"),
            detector_score: 0.7,
            nms_iou: 0.3,
            encoder_input: 112,
            intra_threads: 4,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/dataset"),
            gallery: PathBuf::from("data/gallery.bin"),
            attendance: PathBuf::from("data/attendance/attendance.csv"),
        }
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            late_after: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            retention_days: 90,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            title: "FaceTrack - Live Detection".to_string(),
            font_family: "DejaVuSans".to_string(),
            font_size_pt: 16,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { jpeg_quality: 80 }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "facetrack.json";

    /// Loads the configuration at `path`, falling back to defaults when the
    /// file is missing or unreadable. The result is written back so new
    /// fields show up in the file.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    warn!("Error parsing config {}: {}. Loading defaults.", path.display(), e);
                    Self::default()
                }
            }
        } else {
            info!("Configuration file not found. Creating default at {}", path.display());
            Self::default()
        };

        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.recognition;
        if r.cadence == 0 {
            bail!("recognition.cadence must be at least 1");
        }
        if !(r.tolerance > 0.0) {
            bail!("recognition.tolerance must be positive, got {}", r.tolerance);
        }
        if !(r.downscale > 0.0 && r.downscale <= 1.0) {
            bail!("recognition.downscale must be in (0, 1], got {}", r.downscale);
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!("camera dimensions must be non-zero");
        }
        if self.output.jpeg_quality == 0 || self.output.jpeg_quality > 100 {
            bail!("output.jpeg_quality must be in 1..=100");
        }
        Ok(())
    }

    /// Creates the dataset directory and an empty attendance log.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.dataset).with_context(|| {
            format!("Failed to create dataset dir {}", self.paths.dataset.display())
        })?;
        if let Some(parent) = self.paths.gallery.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        AttendanceLog::new(&self.paths.attendance).ensure_exists()?;
        Ok(())
    }
}
