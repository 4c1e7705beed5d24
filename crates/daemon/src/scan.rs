//! Scanner module for discovering image files in the uploads directory.
//!
//! Listing is deliberately shallow: only direct children of the directory are
//! considered, sub-directories are never entered.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Image file extensions accepted by every entry point (case-insensitive matching).
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// An image file discovered during a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Full path to the image file.
    pub path: PathBuf,
}

/// Result of listing a directory: accepted candidates and files filtered out
/// by extension.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub candidates: Vec<ScanCandidate>,
    pub skipped: Vec<PathBuf>,
}

/// Checks if a string path has a supported image extension (case-insensitive).
///
/// Works on the raw string so it can be used before anything touches the
/// filesystem.
pub fn has_image_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Checks if a file has a supported image extension (case-insensitive).
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            IMAGE_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Error listing a directory.
#[derive(Debug, Error)]
#[error("Failed to list {}: {source}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Lists the direct children of `dir` that are image files.
///
/// This function:
/// - Does not recurse into sub-directories
/// - Returns entries sorted by file name, giving a stable processing order
/// - Filters files by image extension (case-insensitive)
///
/// A directory that cannot be read is an error: the batch runner reports it
/// as its only fatal condition. Individual unreadable entries are skipped.
pub fn list_images(dir: &Path) -> Result<ScanResult, ScanError> {
    // Open the root first so an unreadable directory surfaces as an error
    // instead of an empty listing.
    std::fs::read_dir(dir).map_err(|source| ScanError {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut result = ScanResult::default();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_image_file(path) {
            result.skipped.push(path.to_path_buf());
            continue;
        }

        result.candidates.push(ScanCandidate {
            path: path.to_path_buf(),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_image_extensions_defined() {
        assert!(IMAGE_EXTENSIONS.contains(&".jpg"));
        assert!(IMAGE_EXTENSIONS.contains(&".jpeg"));
        assert!(IMAGE_EXTENSIONS.contains(&".png"));
        assert!(IMAGE_EXTENSIONS.contains(&".webp"));
        assert!(IMAGE_EXTENSIONS.contains(&".gif"));
        assert_eq!(IMAGE_EXTENSIONS.len(), 5);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("/uploads/photo.jpg")));
        assert!(is_image_file(Path::new("/uploads/photo.JPEG"))); // case-insensitive
        assert!(is_image_file(Path::new("/uploads/photo.WebP")));
        assert!(is_image_file(Path::new("/uploads/anim.gif")));
        assert!(!is_image_file(Path::new("/uploads/photo.TXT")));
        assert!(!is_image_file(Path::new("/uploads/photo"))); // no extension
        assert!(!is_image_file(Path::new("/uploads/.png"))); // dotfile, no extension
        assert!(!is_image_file(Path::new("/uploads/photo.png.bak")));
    }

    #[test]
    fn test_has_image_extension_on_raw_strings() {
        assert!(has_image_extension("/uploads/a.PNG"));
        assert!(has_image_extension("/uploads/nested/b.jpeg"));
        assert!(!has_image_extension("/uploads/a.svg"));
        assert!(!has_image_extension("/uploads/"));
    }

    #[test]
    fn test_list_images_is_shallow_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        File::create(root.join("b.png")).unwrap();
        File::create(root.join("a.JPG")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("photo")).unwrap();

        let nested = root.join("nested");
        fs::create_dir_all(&nested).unwrap();
        File::create(nested.join("c.png")).unwrap();

        let result = list_images(root).unwrap();
        let names: Vec<_> = result
            .candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.JPG", "b.png"]);
        assert_eq!(result.skipped.len(), 2);
    }

    #[test]
    fn test_list_images_missing_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = list_images(&missing).unwrap_err();
        assert_eq!(err.path, missing);
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    // *For any* file name, the scanner SHALL accept it if and only if its
    // extension (case-insensitive) is one of: `.jpg`, `.jpeg`, `.png`, `.webp`, `.gif`.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_image_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                Just("jpg"), Just("JPG"), Just("Jpg"),
                Just("jpeg"), Just("JPEG"),
                Just("png"), Just("PNG"), Just("Png"),
                Just("webp"), Just("WEBP"),
                Just("gif"), Just("GIF"),
                Just("txt"), Just("TXT"), Just("svg"), Just("bmp"),
                Just("tiff"), Just("heic"), Just("pdf"), Just("mkv"),
            ],
        ) {
            let raw = format!("/uploads/{}.{}", basename, ext);
            let expected = matches!(
                ext.to_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "gif"
            );

            prop_assert_eq!(is_image_file(Path::new(&raw)), expected);
            prop_assert_eq!(has_image_extension(&raw), expected);
        }
    }
}
