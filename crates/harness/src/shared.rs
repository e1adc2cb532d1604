use std::path::PathBuf;

use contactlink_engine::Engine;
use contactlink_storage::{SqliteStorage, StorageError};
use tempfile::TempDir;

/// A SQLite file in a temp directory that several independent engines open,
/// each with its own connection, the way concurrent server processes would.
pub struct SharedDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl SharedDatabase {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("contacts.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Open a fresh connection and wrap it in an engine.
    pub fn worker(&self) -> Result<Engine<SqliteStorage>, StorageError> {
        Ok(Engine::new(SqliteStorage::open(&self.path())?))
    }
}
