//! Shared file-system walking for the built-in agents
//!
//! Blocking; callers run it inside `spawn_blocking`.

use crate::config::ScannerSection;
use crate::error::AgentError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Relative paths found under a root, both sorted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub files: Vec<String>,
    pub directories: Vec<String>,
    /// True when `max_files` cut the walk short
    pub truncated: bool,
}

/// A source file selected for analysis
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Resolve and check an analysis root
pub fn resolve_root(root: &str) -> Result<PathBuf, AgentError> {
    if root.trim().is_empty() {
        return Err(AgentError::validation_error("analysis root is empty"));
    }
    let path = PathBuf::from(root);
    if !path.is_dir() {
        return Err(AgentError::validation_error(format!(
            "analysis root '{root}' is not a directory"
        )));
    }
    Ok(path)
}

fn relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_ignored(name: &str, config: &ScannerSection) -> bool {
    config.ignored_dirs.iter().any(|ignored| ignored == name)
}

/// Walk `root`, skipping ignored directories, up to `max_files` files
///
/// Siblings are visited in file-name order, so a truncated walk keeps the
/// first `max_files` files of that order. Entries that cannot be read are
/// logged and skipped; only an unreadable root fails the walk.
pub fn walk(root: &Path, config: &ScannerSection) -> io::Result<ScanResult> {
    let mut result = ScanResult::default();

    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let skip = e.depth() > 0
                && e.file_type().is_dir()
                && is_ignored(&e.file_name().to_string_lossy(), config);
            if skip {
                debug!("Skipping ignored directory {}", e.path().display());
            }
            !skip
        });

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            result.directories.push(relative(root, entry.path()));
        } else if file_type.is_file() {
            if result.files.len() >= config.max_files {
                result.truncated = true;
                continue;
            }
            result.files.push(relative(root, entry.path()));
        }
    }

    if result.truncated {
        warn!(
            "Scan of {} stopped at {} files",
            root.display(),
            config.max_files
        );
    }

    result.files.sort();
    result.directories.sort();
    Ok(result)
}

/// Whether a relative path has one of the configured source extensions
pub fn is_source_file(path: &str, config: &ScannerSection) -> bool {
    if config.extensions.is_empty() {
        return true;
    }
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| config.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Read every source file under `root`
///
/// Files larger than `max_file_bytes` or not valid UTF-8 are skipped.
pub fn read_sources(root: &Path, config: &ScannerSection) -> io::Result<Vec<SourceFile>> {
    let scan = walk(root, config)?;
    let mut sources = Vec::new();

    for path in scan.files.into_iter().filter(|p| is_source_file(p, config)) {
        let full = root.join(&path);
        let size = match fs::metadata(&full) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("Skipping {}: {}", path, e);
                continue;
            }
        };
        if size > config.max_file_bytes {
            debug!("Skipping {} ({} bytes)", path, size);
            continue;
        }
        match fs::read_to_string(&full) {
            Ok(content) => sources.push(SourceFile { path, content }),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                debug!("Skipping non-UTF-8 file {}", path);
            }
            Err(e) => warn!("Skipping {}: {}", path, e),
        }
    }

    Ok(sources)
}

/// Run a blocking scan on the blocking pool
pub async fn run_blocking<T, F>(work: F) -> Result<T, AgentError>
where
    F: FnOnce() -> Result<T, AgentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AgentError::internal_error(format!("scan task failed: {e}")))?
}
