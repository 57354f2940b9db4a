use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Maps source directories onto the output tree.
///
/// Without a destination root outputs land next to their sources. With one,
/// the directory layout under the source root is reproduced under it.
#[derive(Debug, Clone)]
pub struct PathMirror {
    source_root: Utf8PathBuf,
    dest_root: Option<Utf8PathBuf>,
}

impl PathMirror {
    pub fn new(source_root: impl Into<Utf8PathBuf>, dest_root: Option<Utf8PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root,
        }
    }

    /// Destination directory for a directory under the source root.
    ///
    /// A directory outside the source root maps to the destination root itself.
    pub fn destination_dir(&self, source_dir: &Utf8Path) -> Utf8PathBuf {
        let Some(dest_root) = &self.dest_root else {
            return source_dir.to_path_buf();
        };

        match source_dir.strip_prefix(&self.source_root) {
            Ok(relative) if relative.as_str().is_empty() => dest_root.clone(),
            Ok(relative) => dest_root.join(relative),
            Err(_) => {
                tracing::warn!(
                    "{} is not under {}, writing to {}",
                    source_dir,
                    self.source_root,
                    dest_root
                );
                dest_root.clone()
            }
        }
    }

    /// `<destination dir>/<title>.chd`
    pub fn output_path(&self, source_dir: &Utf8Path, title: &str) -> Utf8PathBuf {
        self.destination_dir(source_dir)
            .join(format!("{}.chd", title))
    }
}

/// Create `dir` and its parents if missing.
///
/// Safe to call from several jobs at once for the same directory.
pub fn ensure_dir(dir: &Utf8Path) -> Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to create directory: {}", dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_place_without_dest_root() {
        let mirror = PathMirror::new("/a", None);
        assert_eq!(
            mirror.output_path(Utf8Path::new("/a/x"), "y"),
            Utf8PathBuf::from("/a/x/y.chd")
        );
    }

    #[test]
    fn test_mirrors_relative_layout() {
        let mirror = PathMirror::new("/a", Some("/b".into()));
        assert_eq!(
            mirror.output_path(Utf8Path::new("/a/x"), "y"),
            Utf8PathBuf::from("/b/x/y.chd")
        );
        assert_eq!(
            mirror.destination_dir(Utf8Path::new("/a")),
            Utf8PathBuf::from("/b")
        );
    }

    #[test]
    fn test_outside_source_root_falls_back() {
        let mirror = PathMirror::new("/a", Some("/b".into()));
        assert_eq!(
            mirror.destination_dir(Utf8Path::new("/elsewhere/x")),
            Utf8PathBuf::from("/b")
        );
    }

    #[test]
    fn test_ensure_dir_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let nested = root.join("x/y/z");

        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_ensure_dir_concurrent() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let nested = root.join("shared/out");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = nested.clone();
                std::thread::spawn(move || ensure_dir(&dir))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(nested.is_dir());
    }
}
