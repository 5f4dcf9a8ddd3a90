//! Size-rotated line writer for trace export.
//!
//! When the active file grows past the configured limit it is renamed to
//! `<file>.<timestamp>-<seq>` and a fresh file is started. Only the newest
//! backups are kept.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Default size threshold before rotation (10 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated files to keep.
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Rotation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_backups: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

/// Thread-safe writer that appends lines and rotates by size.
///
/// The file is opened lazily on the first write.
pub struct RotatingFileWriter {
    file_path: PathBuf,
    policy: RotationPolicy,
    file: Mutex<Option<File>>,
    rotations: AtomicU32,
}

impl RotatingFileWriter {
    /// Creates a writer for `file_path`.
    ///
    /// The file is opened lazily on the first write, so construction never
    /// touches the filesystem.
    ///
    /// # Parameters
    ///
    /// * `file_path` - Active trace file; rotated backups are created next to it
    /// * `policy` - Size threshold and number of backups to keep
    pub const fn new(file_path: PathBuf, policy: RotationPolicy) -> Self {
        Self {
            file_path,
            policy,
            file: Mutex::new(None),
            rotations: AtomicU32::new(0),
        }
    }

    /// Appends `line` plus a newline, rotating first if the file is over the limit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if rotating, opening, writing or flushing fails.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        if self.over_limit() {
            *file = None;
            self.rotate()?;
        }

        if file.is_none() {
            *file = Some(OpenOptions::new().create(true).append(true).open(&self.file_path)?);
        }
        let Some(handle) = file.as_mut() else {
            return Err(io::Error::other("trace file unavailable"));
        };

        writeln!(handle, "{line}")?;
        handle.flush()
    }

    fn over_limit(&self) -> bool {
        fs::metadata(&self.file_path).is_ok_and(|metadata| metadata.len() > self.policy.max_bytes)
    }

    fn rotate(&self) -> io::Result<()> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f");
        let seq = self.rotations.fetch_add(1, Ordering::Relaxed);
        let backup = backup_path(&self.file_path, &format!("{stamp}-{seq:06}"));

        if self.file_path.exists() {
            fs::rename(&self.file_path, &backup)?;
        }
        self.prune_backups();
        Ok(())
    }

    /// Deletes all but the newest `max_backups` rotated files.
    fn prune_backups(&self) {
        let pattern = format!("{}.*", glob::Pattern::escape(&self.file_path.to_string_lossy()));
        let Ok(paths) = glob::glob(&pattern) else {
            return;
        };

        // Suffixes are timestamp-ordered, so lexical order is age order.
        let mut backups: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
        backups.sort();

        let excess = backups.len().saturating_sub(self.policy.max_backups);
        for stale in backups.iter().take(excess) {
            let _ = fs::remove_file(stale);
        }
    }
}

fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl std::fmt::Debug for RotatingFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFileWriter")
            .field("file_path", &self.file_path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.json");
        let writer = RotatingFileWriter::new(path.clone(), RotationPolicy::default());

        writer.write_line("{\"a\":1}").unwrap();
        writer.write_line("{\"b\":2}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn rotates_and_keeps_only_the_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.json");
        let policy = RotationPolicy {
            max_bytes: 8,
            max_backups: 2,
        };
        let writer = RotatingFileWriter::new(path.clone(), policy);

        for i in 0..6 {
            writer.write_line(&format!("line number {i}")).unwrap();
        }

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("traces.json."))
            .collect();
        assert_eq!(backups.len(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "line number 5\n");
    }
}
