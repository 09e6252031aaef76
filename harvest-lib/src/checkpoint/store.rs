use std::{
    fmt::Debug,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use log::{error, warn};

use super::{CHECKPOINT_FORMAT, CheckpointRecord};
use crate::{ErrorKind, Result};

/// Durable storage for checkpoint records
pub trait CheckpointStore: Send + Sync + Debug {
    /// Load the most recent valid record, `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a record exists but none can be read back.
    fn load(&self) -> Result<Option<CheckpointRecord>>;

    /// Persist `record`, replacing the previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written. The previously
    /// saved record must stay readable in that case.
    fn save(&self, record: &CheckpointRecord) -> Result<()>;
}

/// Stores checkpoints as a JSON file, keeping the previous generation
/// next to it as a fallback.
///
/// Saving writes `<path>.tmp`, syncs it, moves the current file to
/// `<path>.prev` and renames the temporary file into place. An
/// interrupted save therefore leaves at least one readable generation.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// A store writing to `path`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// The main checkpoint file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The previous generation, used when the main file is unreadable
    #[must_use]
    pub fn previous_path(&self) -> PathBuf {
        with_suffix(&self.path, "prev")
    }

    fn read(path: &Path) -> Result<CheckpointRecord> {
        let bytes = fs::read(path).map_err(|source| ErrorKind::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })?;
        let record: CheckpointRecord =
            serde_json::from_slice(&bytes).map_err(|source| ErrorKind::CheckpointFormat {
                path: path.to_path_buf(),
                source,
            })?;
        if record.format != CHECKPOINT_FORMAT {
            return Err(ErrorKind::CheckpointVersion {
                path: path.to_path_buf(),
                found: record.format,
                expected: CHECKPOINT_FORMAT,
            });
        }
        Ok(record)
    }
}

impl CheckpointStore for JsonFileStore {
    fn load(&self) -> Result<Option<CheckpointRecord>> {
        let previous = self.previous_path();
        match (self.path.exists(), previous.exists()) {
            (false, false) => Ok(None),
            (false, true) => {
                warn!(
                    "Checkpoint `{}` is missing, using previous generation `{}`",
                    self.path.display(),
                    previous.display()
                );
                Self::read(&previous).map(Some)
            }
            (true, has_previous) => match Self::read(&self.path) {
                Ok(record) => Ok(Some(record)),
                Err(e) if has_previous => {
                    error!("{e}. Falling back to `{}`", previous.display());
                    Self::read(&previous).map(Some).map_err(|_| e)
                }
                Err(e) => Err(e),
            },
        }
    }

    fn save(&self, record: &CheckpointRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(|source| ErrorKind::CheckpointFormat {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

/// Write `contents` to `path` so that readers never observe a partial file.
///
/// An existing file at `path` is kept as `<path>.prev`.
///
/// # Errors
///
/// Returns [`ErrorKind::CheckpointIo`] if any step fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp = with_suffix(path, "tmp");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let mut file = File::create(&temp).map_err(io_error(&temp))?;
    file.write_all(contents).map_err(io_error(&temp))?;
    file.sync_all().map_err(io_error(&temp))?;
    drop(file);

    if path.exists() {
        let previous = with_suffix(path, "prev");
        fs::rename(path, &previous).map_err(io_error(&previous))?;
    }
    fs::rename(&temp, path).map_err(io_error(path))?;
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ErrorKind + use<> {
    let path = path.to_path_buf();
    move |source| ErrorKind::CheckpointIo { path, source }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::checkpoint::tests::record;

    #[test]
    fn test_missing_checkpoint_is_a_cold_start() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let saved = record(3);
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_previous_generation_is_kept() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        store.save(&record(1)).unwrap();
        store.save(&record(2)).unwrap();

        assert_eq!(store.load().unwrap().unwrap().version, 2);
        let previous: CheckpointRecord =
            serde_json::from_slice(&fs::read(store.previous_path()).unwrap()).unwrap();
        assert_eq!(previous.version, 1);
    }

    #[test]
    fn test_corrupt_checkpoint_falls_back_to_previous() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        store.save(&record(1)).unwrap();
        store.save(&record(2)).unwrap();
        fs::write(store.path(), b"{\"format\": 1, \"vers").unwrap();

        assert_eq!(store.load().unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_corrupt_checkpoint_without_fallback_is_fatal() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        fs::write(store.path(), b"not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, ErrorKind::CheckpointFormat { .. }));
        assert!(err.is_checkpoint_error());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let mut future = record(1);
        future.format = CHECKPOINT_FORMAT + 1;
        fs::write(store.path(), serde_json::to_vec(&future).unwrap()).unwrap();

        assert!(matches!(
            store.load(),
            Err(ErrorKind::CheckpointVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_write_atomic_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("names.json");
        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");
    }
}
