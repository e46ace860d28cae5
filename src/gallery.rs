//! Known-face gallery: index-aligned embeddings and labels.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{Embedding, Label};

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("gallery I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gallery encoding error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("gallery store is misaligned: {encodings} encodings but {names} names")]
    Misaligned { encodings: usize, names: usize },
}

/// One (embedding, label) pair borrowed from a gallery.
#[derive(Debug, Clone, Copy)]
pub struct GalleryEntry<'a> {
    pub embedding: &'a [f32],
    pub label: &'a str,
}

/// Outcome of matching a single embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub label: Label,
    /// Distance to the closest entry, `None` when the gallery is empty.
    pub distance: Option<f32>,
}

/// The persisted form is exactly this struct: two parallel sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    encodings: Vec<Embedding>,
    names: Vec<String>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, embedding: Embedding, label: impl Into<String>) {
        self.encodings.push(embedding);
        self.names.push(label.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = GalleryEntry<'_>> {
        self.encodings
            .iter()
            .zip(self.names.iter())
            .map(|(embedding, label)| GalleryEntry { embedding, label })
    }

    pub fn labels(&self) -> &[String] {
        &self.names
    }

    /// Entry count per label, in first-seen order.
    pub fn label_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for name in &self.names {
            match counts.iter_mut().find(|(n, _)| n == name) {
                Some((_, c)) => *c += 1,
                None => counts.push((name.clone(), 1)),
            }
        }
        counts
    }

    /// Embedding length of the first entry.
    pub fn dimension(&self) -> Option<usize> {
        self.encodings.first().map(Vec::len)
    }

    /// Index and distance of the closest entry. Entries whose length differs
    /// from the query are skipped.
    pub fn nearest(&self, query: &[f32]) -> Option<(usize, f32)> {
        self.encodings
            .iter()
            .enumerate()
            .filter(|(_, e)| e.len() == query.len())
            .map(|(i, e)| (i, euclidean_distance(e, query)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Labels `query` with its nearest entry when that entry is strictly
    /// closer than `tolerance`, otherwise returns the sentinel.
    pub fn identify(&self, query: &[f32], tolerance: f32) -> Match {
        match self.nearest(query) {
            Some((index, distance)) if distance < tolerance => Match {
                label: Label::Known(self.names[index].clone()),
                distance: Some(distance),
            },
            Some((_, distance)) => Match {
                label: Label::Unknown,
                distance: Some(distance),
            },
            None => Match {
                label: Label::Unknown,
                distance: None,
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let file = File::open(path).map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let gallery: Gallery = bincode::deserialize_from(BufReader::new(file))?;
        if gallery.encodings.len() != gallery.names.len() {
            return Err(GalleryError::Misaligned {
                encodings: gallery.encodings.len(),
                names: gallery.names.len(),
            });
        }
        Ok(gallery)
    }

    /// Loads the gallery, degrading to an empty one on any failure.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            warn!("No gallery at {}. Train the model first.", path.display());
            return Self::new();
        }
        match Self::load(path) {
            Ok(gallery) => {
                info!("Loaded {} known faces from {}", gallery.len(), path.display());
                gallery
            }
            Err(e) => {
                warn!("Error loading gallery: {}", e);
                Self::new()
            }
        }
    }

    /// Writes the gallery through a sibling temp file and renames it over
    /// `path`, so a failed write leaves the previous store intact.
    pub fn save(&self, path: &Path) -> Result<(), GalleryError> {
        let io_err = |source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, self)?;
            writer.flush().map_err(io_err)?;
        }
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
