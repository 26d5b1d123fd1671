//! Atomic snapshot writer.
//!
//! A snapshot is written to a uniquely named temp file inside the target
//! directory, fsynced, and renamed over `dir/dbfilename`. Readers therefore
//! see either the previous complete file or the new complete file. Each
//! SAVE replaces the file; nothing is appended.

use crate::config::RuntimeConfig;
use crate::snapshot::format;
use crate::storage::{SnapshotConsistency, StorageEngine};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that abort a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot directory is not configured")]
    MissingDir,

    #[error("snapshot file name is not configured")]
    MissingFileName,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a successful snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Serializes the store to disk on request.
///
/// Concurrent calls to [`save`](Self::save) run one at a time.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    consistency: SnapshotConsistency,
    write_lock: Mutex<()>,
}

impl SnapshotWriter {
    pub fn new(consistency: SnapshotConsistency) -> Self {
        Self {
            consistency,
            write_lock: Mutex::new(()),
        }
    }

    /// Writes every live entry of `storage` to the configured file.
    ///
    /// This does blocking file I/O; async callers should run it on a
    /// blocking thread.
    pub fn save(
        &self,
        storage: &StorageEngine,
        config: &RuntimeConfig,
    ) -> Result<SnapshotSummary, SnapshotError> {
        let dir = config.dir.as_deref().ok_or(SnapshotError::MissingDir)?;
        let path = config
            .snapshot_path()
            .ok_or(SnapshotError::MissingFileName)?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let entries = storage.snapshot(self.consistency);
        debug!(
            path = %path.display(),
            entries = entries.len(),
            consistency = ?self.consistency,
            "Writing snapshot"
        );

        // Dropping the temp file on any early return removes it.
        let mut tmp = tempfile::Builder::new()
            .prefix(".snapkv-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            format::write_snapshot(&mut writer, &entries, SystemTime::now())?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        let bytes = tmp.as_file().metadata()?.len();

        tmp.persist(&path).map_err(|e| e.error)?;

        info!(path = %path.display(), entries = entries.len(), bytes, "Snapshot saved");

        Ok(SnapshotSummary {
            path,
            entries: entries.len(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::format::testing;
    use bytes::Bytes;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn runtime_for(dir: &Path) -> RuntimeConfig {
        RuntimeConfig::new()
            .with_dir(dir.to_string_lossy())
            .with_dbfilename("dump.rdb")
    }

    #[test]
    fn test_save_writes_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageEngine::new();
        storage.insert(Bytes::from("foo"), Bytes::from("bar"), None);
        storage.insert(Bytes::from("baz"), Bytes::from("qux"), None);
        storage.insert(
            Bytes::from("gone"),
            Bytes::from("x"),
            Some(Duration::from_millis(1)),
        );
        thread::sleep(Duration::from_millis(10));

        let writer = SnapshotWriter::default();
        let summary = writer.save(&storage, &runtime_for(dir.path())).unwrap();

        assert_eq!(summary.path, dir.path().join("dump.rdb"));
        assert_eq!(summary.entries, 2);

        let contents = std::fs::read(&summary.path).unwrap();
        assert_eq!(contents.len() as u64, summary.bytes);

        let mut decoded = testing::decode(&contents);
        decoded.entries.sort();
        assert_eq!(decoded.resize, (2, 0));
        assert_eq!(
            decoded.entries,
            vec![
                (Bytes::from("baz"), Bytes::from("qux")),
                (Bytes::from("foo"), Bytes::from("bar")),
            ]
        );
    }

    #[test]
    fn test_save_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = runtime_for(dir.path());
        let storage = StorageEngine::new();
        let writer = SnapshotWriter::new(SnapshotConsistency::Global);

        storage.insert(Bytes::from("a"), Bytes::from("1"), None);
        writer.save(&storage, &config).unwrap();

        storage.delete(b"a");
        storage.insert(Bytes::from("b"), Bytes::from("2"), None);
        let summary = writer.save(&storage, &config).unwrap();

        let decoded = testing::decode(&std::fs::read(summary.path).unwrap());
        assert_eq!(decoded.entries, vec![(Bytes::from("b"), Bytes::from("2"))]);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageEngine::new();
        SnapshotWriter::default()
            .save(&storage, &runtime_for(dir.path()))
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("dump.rdb")]);
    }

    #[test]
    fn test_missing_configuration() {
        let storage = StorageEngine::new();
        let writer = SnapshotWriter::default();

        let no_dir = RuntimeConfig::new().with_dbfilename("dump.rdb");
        assert!(matches!(
            writer.save(&storage, &no_dir),
            Err(SnapshotError::MissingDir)
        ));

        let no_name = RuntimeConfig::new().with_dir("/tmp");
        assert!(matches!(
            writer.save(&storage, &no_name),
            Err(SnapshotError::MissingFileName)
        ));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = runtime_for(&dir.path().join("does-not-exist"));

        let result = SnapshotWriter::default().save(&StorageEngine::new(), &config);
        assert!(matches!(result, Err(SnapshotError::Io(_))));
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageEngine::new();
        let writer = SnapshotWriter::default();

        storage.insert(Bytes::from("keep"), Bytes::from("me"), None);
        let summary = writer.save(&storage, &runtime_for(dir.path())).unwrap();
        let before = std::fs::read(&summary.path).unwrap();

        // A non-empty directory where the snapshot should land makes the rename fail
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("occupant"), b"x").unwrap();
        let blocked_config = RuntimeConfig::new()
            .with_dir(dir.path().to_string_lossy())
            .with_dbfilename("blocked");

        storage.insert(Bytes::from("new"), Bytes::from("data"), None);
        let result = writer.save(&storage, &blocked_config);
        assert!(matches!(result, Err(SnapshotError::Io(_))));

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["blocked".to_string(), "dump.rdb".to_string()]);

        assert_eq!(std::fs::read(&summary.path).unwrap(), before);
        assert!(blocked.join("occupant").exists());
    }

    #[test]
    fn test_concurrent_saves() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(runtime_for(dir.path()));
        let storage = Arc::new(StorageEngine::new());
        let writer = Arc::new(SnapshotWriter::default());

        for i in 0..100 {
            storage.insert(
                Bytes::from(format!("key:{}", i)),
                Bytes::from(format!("value:{}", i)),
                None,
            );
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (config, storage, writer) =
                    (Arc::clone(&config), Arc::clone(&storage), Arc::clone(&writer));
                thread::spawn(move || writer.save(&storage, &config).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().entries, 100);
        }

        let decoded = testing::decode(&std::fs::read(dir.path().join("dump.rdb")).unwrap());
        assert_eq!(decoded.entries.len(), 100);
    }
}
