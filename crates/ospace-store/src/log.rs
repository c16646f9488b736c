use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use ospace_types::{Category, CheckpointKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::state::{CheckpointRecord, MaterializedState};
use crate::traits::{CheckpointBatch, CheckpointStore, StoreReader};

/// Flush/sync strategy for the checkpoint log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every committed checkpoint.
    EveryCommit,
    /// Rely on OS page-cache buffering.
    #[default]
    OsDefault,
}

/// What happens to older records once a full checkpoint is committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRetention {
    /// Rewrite the log so it holds only the new full checkpoint.
    #[default]
    CompactOnFull,
    /// Keep every record.
    KeepAll,
}

/// Configuration for [`LogFileStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub sync_mode: SyncMode,
    pub retention: LogRetention,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Append-only checkpoint log on disk.
///
/// On-disk format, one frame per committed checkpoint:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized CheckpointRecord)]
/// ```
///
/// Records are only meaningful as a prefix, so recovery stops at the first
/// torn or corrupt frame and truncates the file there.
pub struct LogFileStore {
    path: PathBuf,
    file: File,
    /// Length of the valid prefix of the file.
    offset: u64,
    state: MaterializedState,
    next_seq: u64,
    config: LogConfig,
}

impl LogFileStore {
    /// Open (or create) a log and replay it.
    pub fn open(path: &Path, config: LogConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (records, valid_len) = recover(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(
                path = %path.display(),
                file_len,
                valid_len,
                "discarding torn checkpoint log tail"
            );
            file.set_len(valid_len)?;
        }

        let mut state = MaterializedState::new();
        let mut next_seq = 0;
        for record in &records {
            state.apply(record.kind, &record.edits);
            next_seq = record.seq + 1;
        }

        info!(
            path = %path.display(),
            records = records.len(),
            keys = state.key_count(),
            "checkpoint log opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset: valid_len,
            state,
            next_seq,
            config,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the valid log in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Sequence number the next committed checkpoint will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn state(&self) -> &MaterializedState {
        &self.state
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn append_frame(&mut self, frame: &[u8]) -> StoreResult<()> {
        let written = self.file.write_all(frame).and_then(|()| self.file.flush());
        let synced = written.and_then(|()| match self.config.sync_mode {
            SyncMode::EveryCommit => self.file.sync_data(),
            SyncMode::OsDefault => Ok(()),
        });
        if let Err(e) = synced {
            // Leave no partial frame behind for later appends to follow.
            if let Err(trunc) = self.file.set_len(self.offset) {
                warn!(error = %trunc, "failed to roll back partial checkpoint frame");
            }
            return Err(e.into());
        }
        self.offset += frame.len() as u64;
        Ok(())
    }

    /// Replace the whole log with a single frame via temp file + rename.
    fn rewrite_with(&mut self, frame: &[u8]) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(frame)?;
        tmp.flush()?;
        if self.config.sync_mode == SyncMode::EveryCommit {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.offset = frame.len() as u64;
        debug!(path = %self.path.display(), bytes = self.offset, "checkpoint log compacted");
        Ok(())
    }
}

impl StoreReader for LogFileStore {
    fn read_category(&self, category: &Category) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(self.state.read_category(category))
    }
}

impl CheckpointStore for LogFileStore {
    fn commit(&mut self, batch: CheckpointBatch) -> StoreResult<u64> {
        MaterializedState::validate(batch.edits())?;

        let record = CheckpointRecord {
            seq: self.next_seq,
            kind: batch.kind(),
            edits: batch.into_edits(),
        };
        let frame = encode_frame(&record)?;

        let compact = record.kind == CheckpointKind::Full
            && self.config.retention == LogRetention::CompactOnFull;
        if compact {
            self.rewrite_with(&frame)?;
        } else {
            self.append_frame(&frame)?;
        }

        self.state.apply(record.kind, &record.edits);
        self.next_seq += 1;
        debug!(
            seq = record.seq,
            kind = ?record.kind,
            edits = record.edits.len(),
            offset = self.offset,
            "checkpoint committed to log"
        );
        Ok(record.seq)
    }
}

impl std::fmt::Debug for LogFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFileStore")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

fn encode_frame(record: &CheckpointRecord) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len()).map_err(|_| {
        StoreError::Serialization(format!("checkpoint record of {} bytes", payload.len()))
    })?;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Read the valid prefix of a log: its records and its length in bytes.
fn recover(path: &Path) -> StoreResult<(Vec<CheckpointRecord>, u64)> {
    let mut file = BufReader::new(File::open(path)?);
    let file_len = file.get_ref().metadata()?.len();
    let mut records = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header_buf = [0u8; HEADER_SIZE];
        match file.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]]);
        let expected_crc =
            u32::from_le_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]);

        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "invalid checkpoint frame length; stopping recovery");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated checkpoint frame; stopping recovery");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; stopping recovery"
            );
            break;
        }

        match bincode::deserialize::<CheckpointRecord>(&payload) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(offset, error = %e, "undecodable checkpoint record; stopping recovery");
                break;
            }
        }

        offset += HEADER_SIZE as u64 + length as u64;
    }

    debug!(recovered = records.len(), valid_len = offset, "checkpoint log recovery complete");
    Ok((records, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreWriter;
    use ospace_types::{ArtifactId, Edit};
    use std::io::{Seek, SeekFrom};

    fn items() -> Category {
        Category::items(&ArtifactId::new("bar").unwrap())
    }

    fn batch(kind: CheckpointKind, edits: Vec<Edit>) -> CheckpointBatch {
        let mut batch = CheckpointBatch::new(kind);
        for edit in edits {
            batch.append(edit).unwrap();
        }
        batch
    }

    fn keep_all() -> LogConfig {
        LogConfig {
            retention: LogRetention::KeepAll,
            ..LogConfig::default()
        }
    }

    #[test]
    fn commit_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.log");

        let mut log = LogFileStore::open(&path, keep_all()).unwrap();
        log.commit(batch(
            CheckpointKind::Full,
            vec![Edit::put(items(), "0", vec![2]), Edit::put(items(), "1", vec![3])],
        ))
        .unwrap();
        log.commit(batch(
            CheckpointKind::Differential,
            vec![Edit::delete(items(), "1")],
        ))
        .unwrap();
        drop(log);

        let log = LogFileStore::open(&path, keep_all()).unwrap();
        assert_eq!(log.next_seq(), 2);
        assert_eq!(
            log.read_category(&items()).unwrap(),
            vec![("0".to_string(), vec![2])]
        );
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("space.log");
        let log = LogFileStore::open(&path, LogConfig::default()).unwrap();
        assert_eq!(log.offset(), 0);
        assert!(path.exists());
    }

    #[test]
    fn torn_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.log");

        let mut log = LogFileStore::open(&path, keep_all()).unwrap();
        log.commit(batch(CheckpointKind::Full, vec![Edit::put(items(), "0", vec![1])]))
            .unwrap();
        let first_len = log.offset();
        log.commit(batch(
            CheckpointKind::Differential,
            vec![Edit::put(items(), "1", vec![2])],
        ))
        .unwrap();
        let total_len = log.offset();
        drop(log);

        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total_len - 3).unwrap();
        }

        let mut log = LogFileStore::open(&path, keep_all()).unwrap();
        assert_eq!(log.offset(), first_len);
        assert_eq!(log.read_category(&items()).unwrap().len(), 1);

        // New commits land right after the valid prefix.
        log.commit(batch(
            CheckpointKind::Differential,
            vec![Edit::put(items(), "2", vec![9])],
        ))
        .unwrap();
        drop(log);
        let log = LogFileStore::open(&path, keep_all()).unwrap();
        let keys: Vec<String> = log
            .read_category(&items())
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["0".to_string(), "2".to_string()]);
    }

    #[test]
    fn crc_mismatch_stops_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.log");

        let mut log = LogFileStore::open(&path, keep_all()).unwrap();
        log.commit(batch(CheckpointKind::Full, vec![Edit::put(items(), "0", vec![1])]))
            .unwrap();
        log.commit(batch(
            CheckpointKind::Differential,
            vec![Edit::put(items(), "1", vec![2])],
        ))
        .unwrap();
        drop(log);

        // Flip the first payload byte of the first frame.
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        // A later differential record is meaningless without the one before.
        let log = LogFileStore::open(&path, keep_all()).unwrap();
        assert!(log.state().is_empty());
        assert_eq!(log.offset(), 0);
    }

    #[test]
    fn full_checkpoint_compacts_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compact.log");

        let mut log = LogFileStore::open(&path, LogConfig::default()).unwrap();
        for i in 0..5u8 {
            log.commit(batch(
                CheckpointKind::Differential,
                vec![Edit::put(items(), i.to_string(), vec![i])],
            ))
            .unwrap();
        }
        let before = log.offset();
        log.commit(batch(CheckpointKind::Full, vec![Edit::put(items(), "0", vec![7])]))
            .unwrap();
        assert!(log.offset() < before);
        drop(log);

        let log = LogFileStore::open(&path, LogConfig::default()).unwrap();
        assert_eq!(log.next_seq(), 6);
        assert_eq!(
            log.read_category(&items()).unwrap(),
            vec![("0".to_string(), vec![7])]
        );
    }

    #[test]
    fn keep_all_retains_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.log");

        let mut log = LogFileStore::open(&path, keep_all()).unwrap();
        log.commit(batch(CheckpointKind::Full, vec![Edit::put(items(), "0", vec![1])]))
            .unwrap();
        let first = log.offset();
        log.commit(batch(CheckpointKind::Full, vec![Edit::put(items(), "1", vec![2])]))
            .unwrap();
        assert!(log.offset() > first);
        assert_eq!(
            log.read_category(&items()).unwrap(),
            vec![("1".to_string(), vec![2])]
        );
    }

    #[test]
    fn sync_every_commit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.log");
        let config = LogConfig {
            sync_mode: SyncMode::EveryCommit,
            ..LogConfig::default()
        };
        let mut log = LogFileStore::open(&path, config.clone()).unwrap();
        log.commit(batch(
            CheckpointKind::Differential,
            vec![Edit::put(items(), "0", vec![1])],
        ))
        .unwrap();
        drop(log);
        let log = LogFileStore::open(&path, config).unwrap();
        assert_eq!(log.state().key_count(), 1);
    }

    #[test]
    fn config_serde_names() {
        let config = LogConfig {
            sync_mode: SyncMode::EveryCommit,
            retention: LogRetention::KeepAll,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("every_commit"));
        assert!(json.contains("keep_all"));
        let parsed: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, LogConfig::default());
    }
}
