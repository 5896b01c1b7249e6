//! File-backed save slot.
//!
//! A slot is a single file holding one complete save record. Saves go to a
//! sibling `.tmp` file first and are renamed into place, so a crash mid-save
//! leaves the previous record intact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::codec::{GameDataReader, GameDataWriter, Persistable};
use crate::PersistError;

/// A single save file on disk.
#[derive(Debug, Clone)]
pub struct SaveStore {
    path: PathBuf,
}

impl SaveStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a record has been written to this slot.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Serialize `obj` and replace the slot contents. Returns the record size in bytes.
    pub fn save<P: Persistable + ?Sized>(&self, obj: &P) -> Result<usize, PersistError> {
        let _span = tracing::info_span!("save_store_write", path = %self.path.display()).entered();
        let mut writer = GameDataWriter::new();
        obj.save(&mut writer);
        let bytes = writer.into_bytes();
        write_bytes_atomic(&self.path, &bytes)?;
        tracing::debug!(bytes = bytes.len(), "save record written");
        Ok(bytes.len())
    }

    /// Read the whole slot and hand it to `obj`.
    pub fn load<P: Persistable + ?Sized>(&self, obj: &mut P) -> Result<(), P::Error> {
        let _span = tracing::info_span!("save_store_read", path = %self.path.display()).entered();
        let bytes = self.read_bytes()?;
        let mut reader = GameDataReader::new(&bytes);
        obj.load(&mut reader)?;
        if !reader.is_exhausted() {
            tracing::debug!(trailing = reader.remaining(), "save record has trailing bytes");
        }
        Ok(())
    }

    /// Raw record bytes, for inspection tools.
    pub fn read_bytes(&self) -> Result<Vec<u8>, PersistError> {
        Ok(fs::read(&self.path)?)
    }
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("save");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
