//! Dataset layout: one folder per student under the dataset root.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A registered student as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub name: String,
    pub folder: String,
    pub images: usize,
}

/// Folder key for a display name: `"Ada Lovelace"` -> `"ada_lovelace"`.
pub fn folder_key(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Folder key for `name`, or `None` when the key would not name a single
/// folder directly under the dataset root (empty, `.`, `..`, separators).
pub fn checked_folder_key(name: &str) -> Option<String> {
    let key = folder_key(name);
    if key.contains(|c| c == '/' || c == '\\') {
        return None;
    }
    let mut parts = Path::new(&key).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) => Some(key),
        _ => None,
    }
}

/// Display name for a folder key: `"ada_lovelace"` -> `"Ada Lovelace"`.
pub fn display_name(folder: &str) -> String {
    title_case(&folder.replace('_', " "))
}

// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Identity folders under `root`, sorted by name. A missing root is empty.
pub fn person_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Failed to list {}", root.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Supported images directly inside `dir`, sorted by name.
pub fn person_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

pub fn list_students(root: &Path) -> Result<Vec<Student>> {
    let mut students = Vec::new();
    for dir in person_dirs(root)? {
        let folder = folder_name(&dir);
        students.push(Student {
            name: display_name(&folder),
            images: person_images(&dir)?.len(),
            folder,
        });
    }
    Ok(students)
}

/// Supported images anywhere below `root`.
pub fn count_images(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
        .count()
}

pub(crate) fn folder_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_name_normalization() {
        assert_eq!(folder_key("Ada Lovelace"), "ada_lovelace");
        assert_eq!(folder_key("  Grace  "), "grace");
        assert_eq!(display_name("ada_lovelace"), "Ada Lovelace");
        assert_eq!(display_name("JOHN_o'neil"), "John O'Neil");
        assert_eq!(display_name(&folder_key("Mary Ann Evans")), "Mary Ann Evans");
    }

    #[test]
    fn test_checked_folder_key() {
        assert_eq!(checked_folder_key("Ada Lovelace").as_deref(), Some("ada_lovelace"));
        assert_eq!(checked_folder_key("O'Neil").as_deref(), Some("o'neil"));
        for bad in ["", "   ", ".", "..", " .. ", "../x", "a/b", "a\\b", "/etc"] {
            assert_eq!(checked_folder_key(bad), None, "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_image(Path::new("a/b.JPG")));
        assert!(is_supported_image(Path::new("b.jpeg")));
        assert!(is_supported_image(Path::new("b.bmp")));
        assert!(!is_supported_image(Path::new("b.gif")));
        assert!(!is_supported_image(Path::new("README")));
    }

    #[test]
    fn test_list_students() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("bob_smith")).unwrap();
        fs::create_dir_all(root.join("alice")).unwrap();
        fs::write(root.join("alice").join("1.jpg"), b"x").unwrap();
        fs::write(root.join("alice").join("2.png"), b"x").unwrap();
        fs::write(root.join("alice").join("notes.txt"), b"x").unwrap();
        fs::write(root.join("stray.jpg"), b"x").unwrap();

        let students = list_students(root).unwrap();
        assert_eq!(
            students,
            vec![
                Student { name: "Alice".into(), folder: "alice".into(), images: 2 },
                Student { name: "Bob Smith".into(), folder: "bob_smith".into(), images: 0 },
            ]
        );
        assert_eq!(count_images(root), 3);
        assert!(list_students(&root.join("missing")).unwrap().is_empty());
    }
}
