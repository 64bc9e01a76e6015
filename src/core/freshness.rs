/// Freshness guard — detects on-disk edits to loaded definition files.

use std::path::{Path, PathBuf};

use crate::core::grammar::GrammarError;
use crate::core::loader::LoadedFile;

/// Modification times recorded at the last load, root file first.
#[derive(Debug, Clone, Default)]
pub struct FreshnessGuard {
    stamps: Vec<LoadedFile>,
}

impl FreshnessGuard {
    pub fn new(stamps: Vec<LoadedFile>) -> Self {
        Self { stamps }
    }

    /// Replace the recorded stamps after a (re)load.
    pub fn record(&mut self, stamps: Vec<LoadedFile>) {
        self.stamps = stamps;
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }

    /// The root file of the last load, if any.
    pub fn root(&self) -> Option<&Path> {
        self.stamps.first().map(|f| f.path.as_path())
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.stamps.iter().map(|f| f.path.as_path())
    }

    /// The first watched file whose modification time no longer matches.
    ///
    /// A file that can no longer be stat'ed is an error, not a change.
    pub fn stale_file(&self) -> Result<Option<PathBuf>, GrammarError> {
        for stamp in &self.stamps {
            let modified = std::fs::metadata(&stamp.path)
                .and_then(|m| m.modified())
                .map_err(|source| GrammarError::Io {
                    path: stamp.path.clone(),
                    source,
                })?;
            if modified != stamp.modified {
                return Ok(Some(stamp.path.clone()));
            }
        }
        Ok(None)
    }

    pub fn is_stale(&self) -> Result<bool, GrammarError> {
        Ok(self.stale_file()?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, SystemTime};

    #[test]
    fn empty_guard_is_never_stale() {
        let guard = FreshnessGuard::default();
        assert!(!guard.is_stale().unwrap());
        assert!(guard.root().is_none());
    }

    #[test]
    fn detects_changed_mtime() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#a\nx").unwrap();
        let modified = file.as_file().metadata().unwrap().modified().unwrap();
        let guard = FreshnessGuard::new(vec![LoadedFile {
            path: file.path().to_path_buf(),
            modified,
        }]);
        assert!(!guard.is_stale().unwrap());

        file.as_file()
            .set_modified(modified + Duration::from_secs(5))
            .unwrap();
        assert_eq!(guard.stale_file().unwrap().as_deref(), Some(file.path()));
    }

    #[test]
    fn vanished_file_is_error() {
        let guard = FreshnessGuard::new(vec![LoadedFile {
            path: PathBuf::from("tests/fixtures/vanished.txt"),
            modified: SystemTime::UNIX_EPOCH,
        }]);
        assert!(matches!(guard.stale_file(), Err(GrammarError::Io { .. })));
    }
}
