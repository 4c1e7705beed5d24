//! Path validation for client-supplied image paths.
//!
//! A request names an image by its public URL path (`/uploads/photo.jpg`).
//! Validation is purely lexical and never touches the filesystem; a path
//! that passes resolves to a location under the public root.

use std::path::PathBuf;
use thiserror::Error;
use tilemark_config::PathsConfig;

use crate::scan::has_image_extension;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("Image path is required")]
    MissingPath,

    #[error("Invalid image path")]
    OutsideSandbox,

    #[error("Image path must reference a file, not a directory")]
    NotAFile,

    #[error("Only image files (jpg, jpeg, png, webp, gif) can be watermarked")]
    UnsupportedExtension,
}

impl SandboxError {
    /// HTTP status code for this rejection.
    pub fn status_code(&self) -> u16 {
        match self {
            SandboxError::OutsideSandbox => 403,
            SandboxError::MissingPath | SandboxError::NotAFile | SandboxError::UnsupportedExtension => 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    public_root: PathBuf,
    uploads_prefix: String,
}

impl SandboxPolicy {
    pub fn new(public_root: impl Into<PathBuf>, uploads_prefix: impl Into<String>) -> Self {
        Self {
            public_root: public_root.into(),
            uploads_prefix: uploads_prefix.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.public_dir.clone(), paths.uploads_prefix.clone())
    }

    pub fn public_root(&self) -> &PathBuf {
        &self.public_root
    }

    /// Check `raw` and resolve it under the public root.
    ///
    /// Checks run in a fixed order so each input maps to exactly one error:
    /// missing, outside the uploads area, directory-like, wrong extension.
    pub fn validate(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        if raw.is_empty() {
            return Err(SandboxError::MissingPath);
        }

        if !raw.starts_with(&self.uploads_prefix) || has_parent_segment(raw) || raw.contains('\0') {
            return Err(SandboxError::OutsideSandbox);
        }

        if raw.ends_with('/') || raw.ends_with('\\') {
            return Err(SandboxError::NotAFile);
        }

        if !has_image_extension(raw) {
            return Err(SandboxError::UnsupportedExtension);
        }

        let relative = raw.trim_start_matches('/');
        Ok(self.public_root.join(relative))
    }
}

fn has_parent_segment(raw: &str) -> bool {
    raw.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn policy() -> SandboxPolicy {
        SandboxPolicy::new("/srv/site/public", "/uploads/")
    }

    #[test]
    fn test_valid_path_resolves_under_public_root() {
        let resolved = policy().validate("/uploads/photo.jpg").unwrap();
        assert_eq!(resolved, Path::new("/srv/site/public/uploads/photo.jpg"));
        assert!(resolved.starts_with(policy().public_root()));
    }

    #[test]
    fn test_empty_path_is_missing() {
        assert_eq!(policy().validate(""), Err(SandboxError::MissingPath));
        assert_eq!(SandboxError::MissingPath.status_code(), 400);
    }

    #[test]
    fn test_paths_outside_uploads_are_forbidden() {
        for raw in [
            "/etc/passwd",
            "../secret.png",
            "/uploads/../secret.png",
            "/uploads/nested/../../secret.png",
            "/uploads/..\\secret.png",
            "uploads/photo.png",
            "/upload/photo.png",
            "/uploads/a\0.png",
        ] {
            assert_eq!(policy().validate(raw), Err(SandboxError::OutsideSandbox), "{:?}", raw);
        }
        assert_eq!(SandboxError::OutsideSandbox.status_code(), 403);
    }

    #[test]
    fn test_dots_inside_a_name_are_allowed() {
        assert!(policy().validate("/uploads/my..photo.png").is_ok());
        assert!(policy().validate("/uploads/v1.2/photo.png").is_ok());
    }

    #[test]
    fn test_directory_path_is_not_a_file() {
        assert_eq!(policy().validate("/uploads/"), Err(SandboxError::NotAFile));
        assert_eq!(policy().validate("/uploads/album/"), Err(SandboxError::NotAFile));
        assert_eq!(policy().validate("/uploads/album.png\\"), Err(SandboxError::NotAFile));
    }

    #[test]
    fn test_unsupported_extension() {
        for raw in ["/uploads/notes.txt", "/uploads/photo", "/uploads/photo.png.exe"] {
            assert_eq!(policy().validate(raw), Err(SandboxError::UnsupportedExtension), "{}", raw);
        }
        assert!(policy().validate("/uploads/PHOTO.JPEG").is_ok());
    }

    #[test]
    fn test_validation_never_touches_filesystem() {
        // Nothing exists under this root; validation still succeeds
        let policy = SandboxPolicy::new("/definitely/not/here", "/uploads/");
        assert!(policy.validate("/uploads/missing.webp").is_ok());
    }

    #[test]
    fn test_from_config() {
        let paths = PathsConfig {
            public_dir: PathBuf::from("public"),
            uploads_prefix: "/media/".to_string(),
        };
        let policy = SandboxPolicy::from_config(&paths);
        assert_eq!(policy.validate("/media/a.gif").unwrap(), Path::new("public/media/a.gif"));
        assert_eq!(policy.validate("/uploads/a.gif"), Err(SandboxError::OutsideSandbox));
    }
}
