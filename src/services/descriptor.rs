//! Picking the file to hand to chdman and finding the track files it needs.
//!
//! [`select_primary`] looks at one directory (an archive's private extraction
//! directory) and returns the single descriptor or image that represents the
//! disc. [`DescriptorParser`] reads a CD descriptor (CUE, GDI or cdrdao TOC) and
//! returns the track files it references that actually exist on disk.
//!
//! The parser is deliberately lenient. A reference to a missing track is dropped
//! rather than failing the job, and lines that do not look like a file
//! reference are ignored. It is not a full grammar for any of the three formats:
//! a quoted name runs to the next `"` and an unquoted name runs to the next
//! whitespace, nothing more.

use super::platform::{
    CD_DESCRIPTOR_EXTENSIONS, DVD_IMAGE_EXTENSIONS, FormatBucket, UNSUPPORTED_EXTENSIONS, classify,
};
use crate::models::{CodecMode, SourceSet};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;

/// What a directory (or a single loose file) offers the codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A CD descriptor; track files still need resolving
    Descriptor(Utf8PathBuf),
    /// A single-file DVD image
    Image(Utf8PathBuf),
    /// A disc format we recognise but chdman cannot read
    Unsupported(Utf8PathBuf),
    NotFound,
}

impl Selection {
    /// Classify one already-chosen file, as the scanner does for loose images
    pub fn for_file(path: &Utf8Path) -> Selection {
        match classify(path) {
            Some(FormatBucket::CdDescriptor) => Selection::Descriptor(path.to_path_buf()),
            Some(FormatBucket::DvdImage) => Selection::Image(path.to_path_buf()),
            Some(FormatBucket::Unsupported) => Selection::Unsupported(path.to_path_buf()),
            Some(FormatBucket::Archive) | None => Selection::NotFound,
        }
    }
}

/// Pick the canonical source file in `dir`.
///
/// Priority: CD descriptors (`cue`, then `gdi`, then `toc`), then DVD images,
/// then recognised-but-unsupported containers. Within one extension the
/// smallest file name wins. Only the top level is examined, except that a
/// directory with no candidates and exactly one sub-directory is treated as a
/// wrapper and selection continues inside it.
pub fn select_primary(dir: &Utf8Path) -> Result<Selection> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Failed to read directory: {}", dir))?
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir, e);
                continue;
            }
        };
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat: {}", entry.path()))?;

        if file_type.is_file() {
            files.push(entry.into_path());
        } else if file_type.is_dir() {
            subdirs.push(entry.into_path());
        }
    }

    files.sort();

    let first_with = |extensions: &[&str]| -> Option<Utf8PathBuf> {
        extensions.iter().find_map(|ext| {
            files
                .iter()
                .find(|f| {
                    f.extension()
                        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
                })
                .cloned()
        })
    };

    if let Some(path) = first_with(CD_DESCRIPTOR_EXTENSIONS) {
        return Ok(Selection::Descriptor(path));
    }
    if let Some(path) = first_with(DVD_IMAGE_EXTENSIONS) {
        return Ok(Selection::Image(path));
    }
    if let Some(path) = first_with(UNSUPPORTED_EXTENSIONS) {
        return Ok(Selection::Unsupported(path));
    }

    if let [only] = subdirs.as_slice() {
        tracing::debug!("No candidates in {}, descending into {}", dir, only);
        return select_primary(only);
    }

    Ok(Selection::NotFound)
}

/// Extracts track references from CD descriptors.
///
/// Holds one compiled pattern per descriptor dialect:
///
/// - `cue_file`: `FILE "Track 01.bin" BINARY` or `FILE track01.bin BINARY`
/// - `gdi_track`: `1 0 4 2352 track01.bin 0`, name optionally quoted
/// - `toc_file`: `FILE "data.bin" 0` / `DATAFILE "data.bin"`
pub struct DescriptorParser {
    cue_file: Regex,
    gdi_track: Regex,
    toc_file: Regex,
}

impl DescriptorParser {
    pub fn new() -> Self {
        Self {
            cue_file: Regex::new(r#"(?i)^\s*FILE\s+(?:"([^"]*)"|(\S+))"#)
                .expect("Invalid CUE FILE regex"),
            gdi_track: Regex::new(r#"^\s*\d+\s+\d+\s+\d+\s+\d+\s+(?:"([^"]+)"|(\S+))\s+-?\d+\s*$"#)
                .expect("Invalid GDI track regex"),
            toc_file: Regex::new(r#"(?i)^\s*(?:FILE|DATAFILE)\s+(?:"([^"]*)"|(\S+))"#)
                .expect("Invalid TOC FILE regex"),
        }
    }

    /// File names referenced by descriptor text, in order of appearance.
    ///
    /// `dialect` is the descriptor extension (`cue`, `gdi`, `toc`); anything
    /// else is read as CUE.
    pub fn references(&self, dialect: &str, content: &str) -> Vec<String> {
        let (pattern, skip) = match dialect.to_ascii_lowercase().as_str() {
            // The first GDI line is the track count
            "gdi" => (&self.gdi_track, 1),
            "toc" => (&self.toc_file, 0),
            _ => (&self.cue_file, 0),
        };

        content
            .lines()
            .skip(skip)
            .map(|line| line.trim_start_matches('\u{feff}'))
            .filter_map(|line| {
                let caps = pattern.captures(line)?;
                let name = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect()
    }

    /// Existing track files referenced by the descriptor at `descriptor`.
    ///
    /// Relative names resolve against the descriptor's directory. Missing files
    /// and duplicates are dropped; the descriptor itself is never returned.
    pub fn referenced_tracks(&self, descriptor: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let bytes = fs::read(descriptor)
            .with_context(|| format!("Failed to read descriptor: {}", descriptor))?;
        let content = String::from_utf8_lossy(&bytes);

        let base = descriptor.parent().unwrap_or_else(|| Utf8Path::new(""));
        let dialect = descriptor.extension().unwrap_or("cue");

        let mut tracks: Vec<Utf8PathBuf> = Vec::new();
        for name in self.references(dialect, &content) {
            let reference = Utf8Path::new(&name);
            let resolved = if reference.is_absolute() {
                reference.to_path_buf()
            } else {
                base.join(reference)
            };

            if resolved.as_path() == descriptor || tracks.contains(&resolved) {
                continue;
            }

            if resolved.is_file() {
                tracks.push(resolved);
            } else {
                tracing::debug!("Dropping missing track reference {} in {}", name, descriptor);
            }
        }

        tracing::debug!("Descriptor {} references {} existing tracks", descriptor, tracks.len());

        Ok(tracks)
    }

    /// Turn a selection into the source set handed to chdman.
    ///
    /// Returns `None` for [`Selection::Unsupported`] and [`Selection::NotFound`].
    pub fn resolve(&self, selection: &Selection) -> Result<Option<SourceSet>> {
        match selection {
            Selection::Descriptor(primary) => Ok(Some(SourceSet {
                primary: primary.clone(),
                dependents: self.referenced_tracks(primary)?,
                mode: CodecMode::Cd,
            })),
            Selection::Image(primary) => {
                Ok(Some(SourceSet::single(primary.clone(), CodecMode::Dvd)))
            }
            Selection::Unsupported(_) | Selection::NotFound => Ok(None),
        }
    }
}

impl Default for DescriptorParser {
    fn default() -> Self {
        Self::new()
    }
}
