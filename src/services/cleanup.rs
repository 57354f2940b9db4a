use super::job_log::JobLog;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// What the cleanup guard did (or would have done) for one job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<Utf8PathBuf>,
    /// Paths that could not be removed, with the error text
    pub failed: Vec<(Utf8PathBuf, String)>,
    /// Dry-run: candidates that would have been deleted
    pub intended: Vec<Utf8PathBuf>,
    /// Nothing was deleted because the output was missing or empty
    pub blocked: bool,
    /// Bytes freed by the deletions
    pub bytes_freed: u64,
}

/// True when `output` is a regular file with at least one byte
pub fn output_is_valid(output: &Utf8Path) -> bool {
    fs::metadata(output)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Keep only the candidates that resolve inside `scope`.
///
/// Descriptor references may climb out of their directory (`../x.bin`) or be
/// absolute. Files reached that way belong to another disc and are never
/// deleted. Candidates that no longer exist are dropped too.
pub fn confine_to(
    scope: &Utf8Path,
    candidates: Vec<Utf8PathBuf>,
    log: &mut JobLog,
) -> Vec<Utf8PathBuf> {
    let scope = match scope.canonicalize_utf8() {
        Ok(scope) => scope,
        Err(e) => {
            log.warn(format!("Cannot resolve {}, keeping all sources: {}", scope, e));
            return Vec::new();
        }
    };

    candidates
        .into_iter()
        .filter(|path| match path.canonicalize_utf8() {
            Ok(real) if real.starts_with(&scope) => true,
            Ok(_) => {
                log.warn(format!("Keeping {}: outside {}", path, scope));
                false
            }
            Err(_) => false,
        })
        .collect()
}

/// Delete `candidates` once `output` is known to be good.
///
/// Under dry-run nothing is touched and the candidates are reported as
/// intended deletions. Otherwise a missing or empty output blocks every
/// deletion. Candidates that are already gone are skipped quietly; a failed
/// deletion is logged but does not stop the others.
pub fn remove_sources(
    output: &Utf8Path,
    candidates: &[Utf8PathBuf],
    dry_run: bool,
    log: &mut JobLog,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    if dry_run {
        for path in candidates {
            log.would(format!("delete {}", path));
            report.intended.push(path.clone());
        }
        return report;
    }

    if !output_is_valid(output) {
        log.warn(format!(
            "Output {} is missing or empty, keeping {} source file(s)",
            output,
            candidates.len()
        ));
        report.blocked = true;
        return report;
    }

    for path in candidates {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(path) {
            Ok(()) => {
                log.delete(path.as_str());
                report.bytes_freed += size;
                report.deleted.push(path.clone());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Already gone: {}", path);
            }
            Err(e) => {
                log.warn(format!("Failed to delete {}: {}", path, e));
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }

    report
}
