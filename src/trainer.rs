//! Offline training: dataset folders -> face embeddings -> gallery store.

use image::{ImageFormat, RgbImage};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analyzer::FaceAnalyzer;
use crate::dataset::{self, checked_folder_key};
use crate::gallery::{Gallery, GalleryError};
use crate::types::{Embedding, Rect};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("no face encodings found under {0}")]
    NoEncodings(PathBuf),
    #[error("no valid face images supplied for {0}")]
    NoValidImages(String),
    #[error("'{0}' is not a usable student name")]
    InvalidName(String),
    #[error("person '{0}' not found")]
    PersonNotFound(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Dataset(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainSummary {
    pub people: usize,
    pub encodings: usize,
    pub skipped_images: usize,
}

/// What training would make of one person's folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonValidation {
    pub name: String,
    pub total_images: usize,
    pub valid_images: usize,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub people: Vec<PersonValidation>,
}

impl ValidationReport {
    pub fn total_images(&self) -> usize {
        self.people.iter().map(|p| p.total_images).sum()
    }

    pub fn valid_images(&self) -> usize {
        self.people.iter().map(|p| p.valid_images).sum()
    }
}

enum ImageCheck {
    Unreadable(String),
    NoFace,
    Faces(RgbImage, Vec<Rect>),
}

/// Builds the gallery from the dataset and manages the dataset folders.
/// Every operation takes `&mut self`, so training never overlaps itself.
pub struct GalleryTrainer {
    analyzer: Box<dyn FaceAnalyzer>,
    dataset_root: PathBuf,
    gallery_path: PathBuf,
}

impl GalleryTrainer {
    pub fn new(analyzer: Box<dyn FaceAnalyzer>, dataset_root: impl Into<PathBuf>, gallery_path: impl Into<PathBuf>) -> Self {
        Self {
            analyzer,
            dataset_root: dataset_root.into(),
            gallery_path: gallery_path.into(),
        }
    }

    /// One embedding per usable image in the dataset. Unusable images are
    /// skipped with a warning.
    pub fn extract(&mut self) -> Result<Gallery, TrainError> {
        self.extract_counting().map(|(gallery, _)| gallery)
    }

    fn extract_counting(&mut self) -> Result<(Gallery, usize), TrainError> {
        let mut gallery = Gallery::new();
        let mut skipped = 0;

        for dir in dataset::person_dirs(&self.dataset_root)? {
            let label = dataset::display_name(&dataset::folder_name(&dir));
            info!("Processing images for {}...", label);

            for path in dataset::person_images(&dir)? {
                let (image, faces) = match self.check_image(&path) {
                    ImageCheck::Unreadable(e) => {
                        warn!("Error processing {}: {}", path.display(), e);
                        skipped += 1;
                        continue;
                    }
                    ImageCheck::NoFace => {
                        warn!("No face found in {}", path.display());
                        skipped += 1;
                        continue;
                    }
                    ImageCheck::Faces(image, faces) => {
                        if faces.len() > 1 {
                            warn!("Multiple faces found in {}, using the first one", path.display());
                        }
                        (image, faces)
                    }
                };

                match self.first_embedding(&image, &faces) {
                    Ok(Some(embedding)) => gallery.push(embedding, label.clone()),
                    Ok(None) => skipped += 1,
                    Err(e) => {
                        warn!("Error encoding {}: {:#}", path.display(), e);
                        skipped += 1;
                    }
                }
            }
        }

        if gallery.is_empty() {
            return Err(TrainError::NoEncodings(self.dataset_root.clone()));
        }
        Ok((gallery, skipped))
    }

    /// Extracts and saves. When extraction fails nothing is written and the
    /// previous gallery stays in place.
    pub fn train(&mut self) -> Result<TrainSummary, TrainError> {
        info!("Training face recognition model from {}...", self.dataset_root.display());
        let (gallery, skipped_images) = self.extract_counting()?;
        gallery.save(&self.gallery_path)?;

        let summary = TrainSummary {
            people: gallery.label_counts().len(),
            encodings: gallery.len(),
            skipped_images,
        };
        info!(
            "Training completed: {} encodings for {} people saved to {}",
            summary.encodings,
            summary.people,
            self.gallery_path.display()
        );
        Ok(summary)
    }

    /// Checks every image without touching the gallery.
    pub fn validate(&mut self) -> Result<ValidationReport, TrainError> {
        let mut report = ValidationReport::default();
        for dir in dataset::person_dirs(&self.dataset_root)? {
            let images = dataset::person_images(&dir)?;
            let mut person = PersonValidation {
                name: dataset::display_name(&dataset::folder_name(&dir)),
                total_images: images.len(),
                valid_images: 0,
                issues: Vec::new(),
            };
            for path in &images {
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match self.check_image(path) {
                    ImageCheck::Unreadable(e) => person.issues.push(format!("{}: {}", file, e)),
                    ImageCheck::NoFace => person.issues.push(format!("{}: No face detected", file)),
                    ImageCheck::Faces(_, faces) if faces.len() > 1 => {
                        person.issues.push(format!("{}: Multiple faces detected", file))
                    }
                    ImageCheck::Faces(..) => person.valid_images += 1,
                }
            }
            report.people.push(person);
        }
        Ok(report)
    }

    /// Copies every source image that shows a face into the person's folder
    /// as `<key>_<n>.jpg`, then retrains.
    pub fn add_person(&mut self, name: &str, images: &[PathBuf]) -> Result<TrainSummary, TrainError> {
        let key = checked_folder_key(name).ok_or_else(|| TrainError::InvalidName(name.to_string()))?;
        let person_dir = self.dataset_root.join(&key);
        let created = !person_dir.exists();
        fs::create_dir_all(&person_dir).map_err(|source| TrainError::Io {
            path: person_dir.clone(),
            source,
        })?;

        let mut saved = 0;
        for (i, src) in images.iter().enumerate() {
            let image = match self.check_image(src) {
                ImageCheck::Faces(image, _) => image,
                ImageCheck::NoFace => {
                    warn!("No face detected in {}", src.display());
                    continue;
                }
                ImageCheck::Unreadable(e) => {
                    warn!("Error processing {}: {}", src.display(), e);
                    continue;
                }
            };
            let dest = person_dir.join(format!("{}_{}.jpg", key, i + 1));
            match image.save_with_format(&dest, ImageFormat::Jpeg) {
                Ok(()) => saved += 1,
                Err(e) => warn!("Failed to save {}: {}", dest.display(), e),
            }
        }

        if saved == 0 {
            if created {
                let _ = fs::remove_dir(&person_dir);
            }
            return Err(TrainError::NoValidImages(name.to_string()));
        }
        info!("Saved {} images for {}", saved, name);
        self.train()
    }

    /// Deletes the person's folder and retrains. Removing the last person
    /// leaves an empty gallery.
    pub fn remove_person(&mut self, name: &str) -> Result<TrainSummary, TrainError> {
        let key = checked_folder_key(name).ok_or_else(|| TrainError::InvalidName(name.to_string()))?;
        let person_dir = self.dataset_root.join(key);
        if !person_dir.is_dir() {
            return Err(TrainError::PersonNotFound(name.to_string()));
        }
        fs::remove_dir_all(&person_dir).map_err(|source| TrainError::Io {
            path: person_dir.clone(),
            source,
        })?;
        info!("Removed {} from the dataset", name);

        if dataset::person_dirs(&self.dataset_root)?.is_empty() {
            Gallery::new().save(&self.gallery_path)?;
            return Ok(TrainSummary::default());
        }
        self.train()
    }

    fn check_image(&mut self, path: &Path) -> ImageCheck {
        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => return ImageCheck::Unreadable(e.to_string()),
        };
        match self.analyzer.locate(&image) {
            Ok(faces) if faces.is_empty() => ImageCheck::NoFace,
            Ok(faces) => ImageCheck::Faces(image, faces),
            Err(e) => ImageCheck::Unreadable(format!("{:#}", e)),
        }
    }

    fn first_embedding(&mut self, image: &RgbImage, faces: &[Rect]) -> anyhow::Result<Option<Embedding>> {
        let Some(first) = faces.first() else {
            return Ok(None);
        };
        Ok(self.analyzer.encode(image, std::slice::from_ref(first))?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use anyhow::Result;
    use image::Rgb;
    use tempfile::{tempdir, TempDir};

    /// Face count from the red channel of the top-left pixel (dark: none,
    /// mid: one, bright: two); embedding from green and blue.
    struct ColorAnalyzer;

    impl FaceAnalyzer for ColorAnalyzer {
        fn name(&self) -> String {
            "color".into()
        }

        fn locate(&mut self, image: &Frame) -> Result<Vec<Rect>> {
            let r = image.get_pixel(0, 0)[0];
            let n = if r < 64 { 0 } else if r < 192 { 1 } else { 2 };
            Ok((0..n).map(|i| Rect::new(i as f32 * 4.0, 0.0, 4.0, 4.0)).collect())
        }

        fn encode(&mut self, image: &Frame, faces: &[Rect]) -> Result<Vec<Embedding>> {
            let p = image.get_pixel(0, 0);
            Ok(faces
                .iter()
                .map(|_| vec![p[1] as f32 / 255.0, p[2] as f32 / 255.0])
                .collect())
        }
    }

    fn write_png(path: &Path, rgb: [u8; 3]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        Frame::from_pixel(16, 16, Rgb(rgb)).save(path).unwrap();
    }

    fn setup() -> (TempDir, GalleryTrainer, PathBuf) {
        let dir = tempdir().unwrap();
        let gallery = dir.path().join("gallery.bin");
        let trainer = GalleryTrainer::new(Box::new(ColorAnalyzer), dir.path().join("dataset"), &gallery);
        (dir, trainer, gallery)
    }

    #[test]
    fn test_zero_face_image_skipped() {
        let (dir, mut trainer, gallery_path) = setup();
        let alice = dir.path().join("dataset").join("alice");
        write_png(&alice.join("a.png"), [128, 10, 20]);
        write_png(&alice.join("b.png"), [0, 10, 20]);

        let summary = trainer.train().unwrap();
        assert_eq!(summary, TrainSummary { people: 1, encodings: 1, skipped_images: 1 });

        let gallery = Gallery::load(&gallery_path).unwrap();
        assert_eq!(gallery.labels(), &["Alice".to_string()]);
    }

    #[test]
    fn test_multiple_faces_use_first_and_unreadable_skipped() {
        let (dir, mut trainer, gallery_path) = setup();
        let bob = dir.path().join("dataset").join("bob_smith");
        write_png(&bob.join("group.png"), [250, 30, 40]);
        fs::write(bob.join("broken.jpg"), b"not an image").unwrap();

        let summary = trainer.train().unwrap();
        assert_eq!(summary.encodings, 1);
        assert_eq!(summary.skipped_images, 1);
        let gallery = Gallery::load(&gallery_path).unwrap();
        assert_eq!(gallery.labels(), &["Bob Smith".to_string()]);
    }

    #[test]
    fn test_no_encodings_keeps_existing_gallery() {
        let (dir, mut trainer, gallery_path) = setup();
        let mut old = Gallery::new();
        old.push(vec![0.5, 0.5], "Old");
        old.save(&gallery_path).unwrap();
        let before = fs::read(&gallery_path).unwrap();

        write_png(&dir.path().join("dataset").join("alice").join("a.png"), [0, 0, 0]);
        let err = trainer.train().unwrap_err();
        assert!(matches!(err, TrainError::NoEncodings(_)));
        assert_eq!(fs::read(&gallery_path).unwrap(), before);
    }

    #[test]
    fn test_empty_dataset_fails() {
        let (_dir, mut trainer, gallery_path) = setup();
        assert!(matches!(trainer.extract(), Err(TrainError::NoEncodings(_))));
        assert!(!gallery_path.exists());
    }

    #[test]
    fn test_validate_reports_issues() {
        let (dir, mut trainer, _) = setup();
        let alice = dir.path().join("dataset").join("alice");
        write_png(&alice.join("1.png"), [128, 0, 0]);
        write_png(&alice.join("2.png"), [0, 0, 0]);
        write_png(&alice.join("3.png"), [255, 0, 0]);

        let report = trainer.validate().unwrap();
        assert_eq!(report.people.len(), 1);
        let alice = &report.people[0];
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.total_images, 3);
        assert_eq!(alice.valid_images, 1);
        assert_eq!(
            alice.issues,
            vec!["2.png: No face detected".to_string(), "3.png: Multiple faces detected".to_string()]
        );
        assert_eq!(report.valid_images(), 1);
    }

    #[test]
    fn test_add_and_remove_person() {
        let (dir, mut trainer, gallery_path) = setup();
        let uploads = dir.path().join("uploads");
        write_png(&uploads.join("one.png"), [128, 10, 10]);
        write_png(&uploads.join("blank.png"), [0, 0, 0]);
        write_png(&uploads.join("two.png"), [128, 12, 10]);

        let images = vec![uploads.join("one.png"), uploads.join("blank.png"), uploads.join("two.png")];
        let summary = trainer.add_person("Ada Lovelace", &images).unwrap();
        assert_eq!(summary.encodings, 2);

        let folder = dir.path().join("dataset").join("ada_lovelace");
        assert!(folder.join("ada_lovelace_1.jpg").exists());
        assert!(!folder.join("ada_lovelace_2.jpg").exists());
        assert!(folder.join("ada_lovelace_3.jpg").exists());
        assert_eq!(Gallery::load(&gallery_path).unwrap().labels()[0], "Ada Lovelace");

        trainer.remove_person("Ada Lovelace").unwrap();
        assert!(!folder.exists());
        assert!(Gallery::load(&gallery_path).unwrap().is_empty());

        assert!(matches!(
            trainer.remove_person("Ada Lovelace"),
            Err(TrainError::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_unsafe_names_leave_dataset_alone() {
        let (dir, mut trainer, gallery_path) = setup();
        let alice = dir.path().join("dataset").join("alice");
        write_png(&alice.join("a.png"), [128, 10, 20]);
        trainer.train().unwrap();
        let before = fs::read(&gallery_path).unwrap();

        for name in ["", "   ", ".", ".."] {
            let err = trainer.remove_person(name).unwrap_err();
            assert!(matches!(err, TrainError::InvalidName(_)), "{:?}: {}", name, err);
        }
        assert!(alice.join("a.png").exists());
        assert_eq!(fs::read(&gallery_path).unwrap(), before);

        let upload = dir.path().join("uploads").join("face.png");
        write_png(&upload, [128, 40, 40]);
        for name in ["", "  ", "../x", "a/b"] {
            let err = trainer.add_person(name, &[upload.clone()]).unwrap_err();
            assert!(matches!(err, TrainError::InvalidName(_)), "{:?}: {}", name, err);
        }
        assert!(!dir.path().join("x").exists());
        assert!(!dir.path().join("dataset").join("a").exists());
        assert_eq!(fs::read(&gallery_path).unwrap(), before);
    }

    #[test]
    fn test_add_person_without_faces() {
        let (dir, mut trainer, gallery_path) = setup();
        let blank = dir.path().join("uploads").join("blank.png");
        write_png(&blank, [0, 0, 0]);

        let err = trainer.add_person("Nobody", &[blank]).unwrap_err();
        assert!(matches!(err, TrainError::NoValidImages(_)));
        assert!(!dir.path().join("dataset").join("nobody").exists());
        assert!(!gallery_path.exists());
    }
}
