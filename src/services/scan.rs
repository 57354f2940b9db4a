use super::platform::{
    CD_DESCRIPTOR_EXTENSIONS, DVD_IMAGE_EXTENSIONS, FormatBucket, accepts, classify,
};
use crate::models::{Job, JobKind, Platform};
use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use walkdir::{DirEntry, WalkDir};

/// A job left out of the run because another job writes the same CHD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub job: Job,
    /// Source file of the job that keeps the output
    pub winner: Utf8PathBuf,
}

/// Jobs found in a source tree, split by phase
#[derive(Debug, Clone, Default)]
pub struct ScanPlan {
    pub archives: Vec<Job>,
    pub loose: Vec<Job>,
    pub shadowed: Vec<Shadowed>,
}

impl ScanPlan {
    pub fn total(&self) -> usize {
        self.archives.len() + self.loose.len() + self.shadowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Walks the source tree and turns convertible files into jobs.
///
/// Hidden entries (including in-progress extraction directories) are never
/// visited. Loose images are filtered by platform here; archives are always
/// kept because their contents are unknown until extracted.
#[derive(Debug, Clone)]
pub struct Scanner {
    recursive: bool,
    platform: Option<Platform>,
}

impl Scanner {
    pub fn new(recursive: bool, platform: Option<Platform>) -> Self {
        Self {
            recursive,
            platform,
        }
    }

    pub fn scan(&self, root: &Utf8Path) -> Result<ScanPlan> {
        if !root.exists() {
            bail!("Source directory not found: {}", root);
        }
        if !root.is_dir() {
            bail!("Source is not a directory: {}", root);
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        let mut plan = ScanPlan::default();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => path,
                Err(path) => {
                    tracing::warn!("Skipping non UTF-8 path: {}", path.display());
                    continue;
                }
            };

            let kind = match classify(&path) {
                Some(FormatBucket::Archive) => JobKind::Archive,
                Some(FormatBucket::CdDescriptor) => JobKind::LooseDescriptorImage,
                Some(FormatBucket::DvdImage) | Some(FormatBucket::Unsupported) => {
                    JobKind::LooseContainerImage
                }
                None => continue,
            };

            if kind == JobKind::Archive {
                plan.archives.push(Job::new(kind, root, path));
            } else if accepts(&path, self.platform) {
                plan.loose.push(Job::new(kind, root, path));
            } else {
                tracing::debug!("Filtered out by platform: {}", path);
            }
        }

        claim_outputs(&mut plan);

        tracing::info!(
            "Scanned {}: {} archives, {} loose images, {} sharing an output",
            root,
            plan.archives.len(),
            plan.loose.len(),
            plan.shadowed.len()
        );

        Ok(plan)
    }
}

/// Rank of a job when several want the same CHD; lower wins.
///
/// Loose descriptors and DVD images rank in selector order, archives after
/// them. Unsupported images never write an output and take no part.
fn output_rank(job: &Job) -> Option<usize> {
    let convertible: Vec<&str> = CD_DESCRIPTOR_EXTENSIONS
        .iter()
        .chain(DVD_IMAGE_EXTENSIONS)
        .copied()
        .collect();

    match job.kind {
        JobKind::Archive => Some(convertible.len()),
        JobKind::LooseDescriptorImage | JobKind::LooseContainerImage => {
            let ext = job.primary_path().extension()?.to_ascii_lowercase();
            convertible.iter().position(|e| *e == ext)
        }
    }
}

/// Outputs are keyed by directory and case-folded title, so `Game.cue` and
/// `game.iso` collide on case-insensitive filesystems too
fn output_key(job: &Job) -> (Utf8PathBuf, String) {
    (job.source_dir().to_path_buf(), job.title.to_lowercase())
}

/// Give every output path to exactly one job of the run.
///
/// Both phases share one claim table, so a loose image and an archive with
/// the same title in one directory never both convert. Losers move to
/// `plan.shadowed` with their sources untouched.
fn claim_outputs(plan: &mut ScanPlan) {
    let mut winners: HashMap<(Utf8PathBuf, String), (usize, Utf8PathBuf)> = HashMap::new();

    for job in plan.archives.iter().chain(plan.loose.iter()) {
        let Some(rank) = output_rank(job) else {
            continue;
        };
        let candidate = (rank, job.primary_path().to_path_buf());
        let best = winners.entry(output_key(job)).or_insert_with(|| candidate.clone());
        if candidate < *best {
            *best = candidate;
        }
    }

    let mut shadowed = Vec::new();
    let mut keep = |jobs: Vec<Job>| -> Vec<Job> {
        let mut kept = Vec::with_capacity(jobs.len());
        for job in jobs {
            let winner = output_rank(&job)
                .and_then(|_| winners.get(&output_key(&job)))
                .map(|(_, path)| path.clone())
                .filter(|path| path.as_path() != job.primary_path());

            match winner {
                Some(winner) => {
                    tracing::warn!(
                        "{} writes the same output as {}, skipping",
                        job.primary_path(),
                        winner
                    );
                    shadowed.push(Shadowed { job, winner });
                }
                None => kept.push(job),
            }
        }
        kept
    };

    plan.archives = keep(std::mem::take(&mut plan.archives));
    plan.loose = keep(std::mem::take(&mut plan.loose));
    plan.shadowed = shadowed;
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(root.join("Foo.7z"), b"7z").unwrap();
        fs::write(root.join("game.cue"), b"FILE \"game.bin\" BINARY").unwrap();
        fs::write(root.join("game.bin"), b"bin").unwrap();
        fs::write(root.join("disc.iso"), b"iso").unwrap();
        fs::write(root.join("notes.txt"), b"txt").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/deep.iso"), b"iso").unwrap();
        fs::create_dir(root.join(".autochd-tmp")).unwrap();
        fs::write(root.join(".autochd-tmp/hidden.cue"), b"x").unwrap();
        (temp_dir, root)
    }

    fn titles(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.title.as_str()).collect()
    }

    #[test]
    fn test_top_level_scan() {
        let (_temp_dir, root) = tree();
        let plan = Scanner::new(false, None).scan(&root).unwrap();

        assert_eq!(titles(&plan.archives), vec!["Foo"]);
        assert_eq!(titles(&plan.loose), vec!["disc", "game"]);
        assert_eq!(plan.total(), 3);
    }

    #[test]
    fn test_recursive_scan_skips_hidden() {
        let (_temp_dir, root) = tree();
        let plan = Scanner::new(true, None).scan(&root).unwrap();

        assert_eq!(titles(&plan.loose), vec!["disc", "game", "deep"]);
        assert!(plan.loose.iter().all(|j| !j.primary_path().as_str().contains(".autochd")));
    }

    #[test]
    fn test_platform_filter_keeps_archives() {
        let (_temp_dir, root) = tree();
        let plan = Scanner::new(false, Some(Platform::Psx)).scan(&root).unwrap();

        assert_eq!(titles(&plan.archives), vec!["Foo"]);
        assert_eq!(titles(&plan.loose), vec!["game"]);
        assert_eq!(plan.loose[0].kind, JobKind::LooseDescriptorImage);
    }

    #[test]
    fn test_same_output_claimed_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(root.join("game.cue"), b"FILE \"game.bin\" BINARY").unwrap();
        fs::write(root.join("game.bin"), b"bin").unwrap();
        fs::write(root.join("Game.iso"), b"iso").unwrap();
        fs::write(root.join("game.7z"), b"7z").unwrap();
        fs::write(root.join("game.cso"), b"cso").unwrap();

        let plan = Scanner::new(false, None).scan(&root).unwrap();

        assert!(plan.archives.is_empty());
        assert_eq!(plan.loose.len(), 2);
        assert!(plan.loose.iter().any(|j| j.primary_path() == root.join("game.cue")));
        assert!(plan.loose.iter().any(|j| j.primary_path() == root.join("game.cso")));

        let mut losers: Vec<&str> = plan
            .shadowed
            .iter()
            .map(|s| s.job.primary_path().file_name().unwrap())
            .collect();
        losers.sort();
        assert_eq!(losers, vec!["Game.iso", "game.7z"]);
        assert!(plan.shadowed.iter().all(|s| s.winner == root.join("game.cue")));
        assert_eq!(plan.total(), 4);
    }

    #[test]
    fn test_same_title_in_different_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::create_dir(root.join("b")).unwrap();
        fs::write(root.join("a/game.iso"), b"iso").unwrap();
        fs::write(root.join("b/game.iso"), b"iso").unwrap();

        let plan = Scanner::new(true, None).scan(&root).unwrap();

        assert_eq!(plan.loose.len(), 2);
        assert!(plan.shadowed.is_empty());
    }

    #[test]
    fn test_missing_root_is_error() {
        assert!(Scanner::new(false, None)
            .scan(Utf8Path::new("/definitely/not/here"))
            .is_err());
    }
}
