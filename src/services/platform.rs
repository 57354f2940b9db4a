//! Extension-based classification of scanned files.
//!
//! Nothing here opens a file: a `.cue` is a CD descriptor because of its name,
//! and a platform filter accepts or rejects a file by looking its extension up
//! in [`Platform::extensions`].
//!
//! # Examples
//!
//! ```
//! use autochd::models::Platform;
//! use autochd::services::platform::{FormatBucket, accepts, classify};
//! use camino::Utf8Path;
//!
//! assert_eq!(classify(Utf8Path::new("Game.CUE")), Some(FormatBucket::CdDescriptor));
//! assert!(accepts(Utf8Path::new("game.cue"), Some(Platform::Psx)));
//! assert!(!accepts(Utf8Path::new("game.iso"), Some(Platform::Psx)));
//! ```

use crate::models::Platform;
use camino::Utf8Path;

/// CD descriptors in selection priority order
pub const CD_DESCRIPTOR_EXTENSIONS: &[&str] = &["cue", "gdi", "toc"];

/// Single-file DVD images
pub const DVD_IMAGE_EXTENSIONS: &[&str] = &["iso"];

/// Disc formats we recognise but chdman cannot read directly
pub const UNSUPPORTED_EXTENSIONS: &[&str] = &["ccd", "mds", "nrg", "cdi", "cso", "pbp"];

pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z", "rar"];

/// Format family of a file, decided by extension alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatBucket {
    CdDescriptor,
    DvdImage,
    Unsupported,
    Archive,
}

fn lowercase_extension(path: &Utf8Path) -> Option<String> {
    path.extension().map(str::to_ascii_lowercase)
}

/// Classify a path by its extension (case-insensitive)
pub fn classify(path: &Utf8Path) -> Option<FormatBucket> {
    let ext = lowercase_extension(path)?;
    let ext = ext.as_str();

    if CD_DESCRIPTOR_EXTENSIONS.contains(&ext) {
        Some(FormatBucket::CdDescriptor)
    } else if DVD_IMAGE_EXTENSIONS.contains(&ext) {
        Some(FormatBucket::DvdImage)
    } else if UNSUPPORTED_EXTENSIONS.contains(&ext) {
        Some(FormatBucket::Unsupported)
    } else if ARCHIVE_EXTENSIONS.contains(&ext) {
        Some(FormatBucket::Archive)
    } else {
        None
    }
}

/// Decide whether a disc image passes the platform filter.
///
/// Without a filter every path is accepted. With one, only the extensions the
/// platform owns pass; a format shared between consoles is only accepted under
/// the single platform that owns its extension.
pub fn accepts(path: &Utf8Path, filter: Option<Platform>) -> bool {
    let Some(platform) = filter else {
        return true;
    };

    match lowercase_extension(path) {
        Some(ext) => platform.extensions().contains(&ext.as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_buckets() {
        assert_eq!(
            classify(Utf8Path::new("a/game.cue")),
            Some(FormatBucket::CdDescriptor)
        );
        assert_eq!(
            classify(Utf8Path::new("a/game.GDI")),
            Some(FormatBucket::CdDescriptor)
        );
        assert_eq!(
            classify(Utf8Path::new("a/game.iso")),
            Some(FormatBucket::DvdImage)
        );
        assert_eq!(
            classify(Utf8Path::new("a/game.cso")),
            Some(FormatBucket::Unsupported)
        );
        assert_eq!(
            classify(Utf8Path::new("a/Game.7z")),
            Some(FormatBucket::Archive)
        );
        assert_eq!(classify(Utf8Path::new("a/game.bin")), None);
        assert_eq!(classify(Utf8Path::new("a/README")), None);
    }

    #[test]
    fn test_filter_psx_rejects_iso() {
        assert!(accepts(Utf8Path::new("game.cue"), Some(Platform::Psx)));
        assert!(!accepts(Utf8Path::new("game.iso"), Some(Platform::Psx)));
    }

    #[test]
    fn test_no_filter_accepts_everything() {
        assert!(accepts(Utf8Path::new("game.iso"), None));
        assert!(accepts(Utf8Path::new("noext"), None));
    }

    #[test]
    fn test_filter_rejects_missing_extension() {
        assert!(!accepts(Utf8Path::new("noext"), Some(Platform::Ps2)));
    }
}
