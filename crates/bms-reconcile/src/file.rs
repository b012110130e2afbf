//! File-backed configuration store.
//!
//! Layout under the store root:
//!
//! ```text
//! local.json     last generated configuration
//! active.json    running configuration
//! patches.jsonl  patch log, one JSON entry per line
//! ```
//!
//! Documents are replaced atomically (written to a temp file in the same
//! directory, synced, then renamed over the target), so a crash leaves either
//! the old or the new document. The patch log is append-only and is only
//! opened for writing on the first append, which also terminates a torn final
//! line; on read, lines that do not decode are logged and skipped. A store
//! opened with [`FileConfigStore::open_read_only`] never touches the disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bms_block::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::settings::ReconcileSettings;
use crate::store::{ConfigStore, PatchLogEntry};

pub struct FileConfigStore {
    root: PathBuf,
    local_path: PathBuf,
    active_path: PathBuf,
    log_path: PathBuf,
    read_only: bool,
    /// Append handle for the patch log, opened on the first append.
    log: Mutex<Option<File>>,
}

impl FileConfigStore {
    /// Open (or create) a store under `root` with the default file names.
    pub fn open_dir(root: &Path) -> ReconcileResult<Self> {
        Self::open(&ReconcileSettings {
            root: root.to_path_buf(),
            ..ReconcileSettings::default()
        })
    }

    /// Open (or create) the store described by `settings`.
    pub fn open(settings: &ReconcileSettings) -> ReconcileResult<Self> {
        fs::create_dir_all(&settings.root)?;
        Ok(Self::at(settings, false))
    }

    /// Open the store described by `settings` for reading only.
    ///
    /// Nothing on disk is created or modified, not even a missing root; a
    /// missing store reads as empty and every write fails with
    /// [`ReconcileError::ReadOnly`].
    pub fn open_read_only(settings: &ReconcileSettings) -> Self {
        Self::at(settings, true)
    }

    fn at(settings: &ReconcileSettings, read_only: bool) -> Self {
        let root = settings.root.clone();
        Self {
            local_path: root.join(&settings.local_file),
            active_path: root.join(&settings.active_file),
            log_path: root.join(&settings.patch_log_file),
            root,
            read_only,
            log: Mutex::new(None),
        }
    }

    /// True for a store opened with [`FileConfigStore::open_read_only`].
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self) -> ReconcileResult<()> {
        if self.read_only {
            return Err(ReconcileError::ReadOnly(self.root.clone()));
        }
        Ok(())
    }

    /// Open the log for appending. A torn last line is terminated first so the
    /// next entry starts on its own line.
    fn open_log(&self) -> ReconcileResult<File> {
        let mut log = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.log_path)?;
        if !ends_with_newline(&mut log)? {
            warn!(path = %self.log_path.display(), "patch log ends mid-entry; terminating it");
            log.write_all(b"\n")?;
        }
        Ok(log)
    }

    /// Directory holding the documents and the patch log.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_document(&self, path: &Path) -> ReconcileResult<Option<Value>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    fn write_document(&self, path: &Path, config: &Value) -> ReconcileResult<()> {
        self.check_writable()?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, config)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), "document written");
        Ok(())
    }
}

/// True for an empty file.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl ConfigStore for FileConfigStore {
    fn local_config(&self) -> ReconcileResult<Option<Value>> {
        self.read_document(&self.local_path)
    }

    fn set_local_config(&self, config: &Value) -> ReconcileResult<()> {
        self.write_document(&self.local_path, config)
    }

    fn active_config(&self) -> ReconcileResult<Option<Value>> {
        self.read_document(&self.active_path)
    }

    fn set_active_config(&self, config: &Value) -> ReconcileResult<()> {
        self.write_document(&self.active_path, config)
    }

    fn save_patches(&self, entry: &PatchLogEntry) -> ReconcileResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        self.check_writable()?;
        let mut guard = self
            .log
            .lock()
            .map_err(|e| ReconcileError::LockPoisoned(e.to_string()))?;
        let log = match &mut *guard {
            Some(log) => log,
            slot @ None => slot.insert(self.open_log()?),
        };
        log.write_all(line.as_bytes())?;
        log.sync_data()?;

        debug!(patches = entry.patches.len(), len = line.len(), "patch log append");
        Ok(())
    }

    fn patch_log(&self) -> ReconcileResult<Vec<PatchLogEntry>> {
        let file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PatchLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    line = index + 1,
                    error = %e,
                    "skipping malformed patch log entry"
                ),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bms_block::{Patch, Path as BlockPath};
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(n: i64) -> PatchLogEntry {
        PatchLogEntry::now(vec![
            Patch::replace(BlockPath::root().field("n"), Value::from(n)),
            Patch::delete(BlockPath::root().field("objects").elem("id", n)),
        ])
    }

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        assert!(store.local_config().unwrap().is_none());
        assert!(store.active_config().unwrap().is_none());
        assert!(store.patch_log().unwrap().is_empty());
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let local = Value::from(json!({"objects": [{"id": 1, "addr": "foo"}]}));
        let active = Value::from(json!({"objects": [{"id": 1, "addr": "bar"}], "note": "x"}));
        {
            let store = FileConfigStore::open_dir(dir.path()).unwrap();
            store.set_local_config(&local).unwrap();
            store.set_active_config(&active).unwrap();
        }

        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        assert_eq!(store.local_config().unwrap(), Some(local));
        assert_eq!(store.active_config().unwrap(), Some(active));
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        store.set_local_config(&Value::from(json!({"v": 1}))).unwrap();
        store.set_local_config(&Value::from(json!({"v": 2}))).unwrap();

        assert_eq!(store.local_config().unwrap(), Some(Value::from(json!({"v": 2}))));
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["local.json"]);
    }

    #[test]
    fn log_appends_and_recovers() {
        let dir = tempdir().unwrap();
        {
            let store = FileConfigStore::open_dir(dir.path()).unwrap();
            store.save_patches(&entry(1)).unwrap();
            store.save_patches(&entry(2)).unwrap();
        }
        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        store.save_patches(&entry(3)).unwrap();

        let log = store.patch_log().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].patches, entry(3).patches);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        store.save_patches(&entry(1)).unwrap();
        drop(store);

        // Simulate a torn write at the tail.
        let log_path = dir.path().join("patches.jsonl");
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(br#"{"timestamp": "2024-01-01T00:00:00Z", "patc"#).unwrap();
        drop(file);

        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        store.save_patches(&entry(2)).unwrap();

        let log = store.patch_log().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].patches, entry(1).patches);
        assert_eq!(log[1].patches, entry(2).patches);
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("active.json"), b"{not json").unwrap();
        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        assert!(matches!(
            store.active_config(),
            Err(ReconcileError::Serialization(_))
        ));
    }

    #[test]
    fn custom_file_names() {
        let dir = tempdir().unwrap();
        let settings = ReconcileSettings {
            root: dir.path().join("nested"),
            local_file: "generated.json".into(),
            active_file: "running.json".into(),
            patch_log_file: "history.jsonl".into(),
            ..ReconcileSettings::default()
        };
        let store = FileConfigStore::open(&settings).unwrap();
        store.set_active_config(&Value::from(json!([1, 2]))).unwrap();
        store.save_patches(&entry(1)).unwrap();

        assert!(dir.path().join("nested/running.json").exists());
        assert!(dir.path().join("nested/history.jsonl").exists());
        assert_eq!(store.root(), dir.path().join("nested"));
    }

    fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(root)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.file_name().to_string_lossy().into_owned(), fs::read(e.path()).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn read_only_store_creates_nothing() {
        let dir = tempdir().unwrap();
        let settings = ReconcileSettings {
            root: dir.path().join("missing"),
            ..ReconcileSettings::default()
        };
        let store = FileConfigStore::open_read_only(&settings);
        assert!(store.is_read_only());
        assert!(store.local_config().unwrap().is_none());
        assert!(store.patch_log().unwrap().is_empty());

        assert!(matches!(
            store.set_local_config(&Value::from(json!({"v": 1}))),
            Err(ReconcileError::ReadOnly(_))
        ));
        assert!(matches!(store.save_patches(&entry(1)), Err(ReconcileError::ReadOnly(_))));
        assert!(!settings.root.exists());
    }

    #[test]
    fn reading_leaves_a_torn_log_alone() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::open_dir(dir.path()).unwrap();
        store.save_patches(&entry(1)).unwrap();
        drop(store);
        let log_path = dir.path().join("patches.jsonl");
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(br#"{"timestamp": "#).unwrap();
        drop(file);
        let before = snapshot(dir.path());

        let settings = ReconcileSettings {
            root: dir.path().to_path_buf(),
            ..ReconcileSettings::default()
        };
        let read_only = FileConfigStore::open_read_only(&settings);
        assert_eq!(read_only.patch_log().unwrap().len(), 1);
        let writable = FileConfigStore::open(&settings).unwrap();
        assert_eq!(writable.patch_log().unwrap().len(), 1);

        assert_eq!(snapshot(dir.path()), before);
    }
}
