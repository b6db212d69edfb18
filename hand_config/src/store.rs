//! Structured key-value persistence for the calibration file.
//!
//! `update_key` is a single-key upsert: the file is read, one key replaced,
//! and the whole table written back through a temporary file plus rename so a
//! crash mid-write never leaves a truncated file behind.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait Store: Send {
    /// Full contents as a table; empty when nothing has been stored yet.
    fn read_structured(&self) -> eyre::Result<toml::Table>;
    /// Insert or replace `key`, preserving every other key.
    fn update_key(&mut self, key: &str, value: toml::Value) -> eyre::Result<()>;
}

/// Read a TOML file as a table. A missing or empty file reads as empty.
pub fn read_structured(path: &Path) -> eyre::Result<toml::Table> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(toml::Table::new()),
        Err(e) => eyre::bail!("read {:?}: {}", path, e),
    };
    if text.trim().is_empty() {
        return Ok(toml::Table::new());
    }
    text.parse::<toml::Table>()
        .map_err(|e| eyre::eyre!("parse {:?}: {}", path, e))
}

/// Upsert one key in a TOML file, creating the file if needed.
pub fn update_key(path: &Path, key: &str, value: toml::Value) -> eyre::Result<()> {
    let mut table = read_structured(path)?;
    table.insert(key.to_string(), value);
    write_table(path, &table)
}

fn write_table(path: &Path, table: &toml::Table) -> eyre::Result<()> {
    let text = toml::to_string(table).map_err(|e| eyre::eyre!("encode {:?}: {}", path, e))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, text).map_err(|e| eyre::eyre!("write {:?}: {}", tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| eyre::eyre!("replace {:?}: {}", path, e))?;
    Ok(())
}

/// File-backed store bound to one path.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for TomlFileStore {
    fn read_structured(&self) -> eyre::Result<toml::Table> {
        read_structured(&self.path)
    }

    fn update_key(&mut self, key: &str, value: toml::Value) -> eyre::Result<()> {
        update_key(&self.path, key, value)
    }
}

/// In-memory store; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<toml::Table>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: toml::Table) -> Self {
        Self {
            table: Arc::new(Mutex::new(table)),
            writes: Arc::default(),
        }
    }

    /// Snapshot of the current table.
    pub fn snapshot(&self) -> toml::Table {
        self.table.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Keys written so far, in order.
    pub fn write_log(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Store for MemoryStore {
    fn read_structured(&self) -> eyre::Result<toml::Table> {
        self.table
            .lock()
            .map(|t| t.clone())
            .map_err(|_| eyre::eyre!("memory store poisoned"))
    }

    fn update_key(&mut self, key: &str, value: toml::Value) -> eyre::Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| eyre::eyre!("memory store poisoned"))?;
        table.insert(key.to_string(), value);
        if let Ok(mut w) = self.writes.lock() {
            w.push(key.to_string());
        }
        Ok(())
    }
}
