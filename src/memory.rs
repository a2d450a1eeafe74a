//! Memory collaborator: a best-effort sink for orchestrator events.
//!
//! The loop only ever calls [`Memory::log`]. Two variants exist: a JSON-lines
//! journal at the configured storage location, and a console stand-in used
//! when the storage location cannot be opened.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Severity attached to a memory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl MemoryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLevel::Debug => "DEBUG",
            MemoryLevel::Info => "INFO",
            MemoryLevel::Warning => "WARNING",
            MemoryLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for memory implementations (journal, console, or test recorder)
///
/// `log` must never fail or panic; implementations swallow their own errors.
pub trait Memory: Send + Sync {
    fn log(&self, level: MemoryLevel, message: &str);
}

/// One journal line
#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    timestamp: DateTime<Utc>,
    run_id: Uuid,
    level: MemoryLevel,
    message: &'a str,
}

/// Memory backed by an append-only JSON-lines file
pub struct JournalMemory {
    path: PathBuf,
    run_id: Uuid,
    file: Mutex<File>,
}

impl JournalMemory {
    /// Open (or create) the journal at `path`, creating parent directories
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            run_id: Uuid::new_v4(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifier shared by every entry written by this process
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn append(&self, level: MemoryLevel, message: &str) -> std::io::Result<()> {
        let entry = JournalEntry {
            timestamp: Utc::now(),
            run_id: self.run_id,
            level,
            message,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("journal lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

impl Memory for JournalMemory {
    fn log(&self, level: MemoryLevel, message: &str) {
        if let Err(e) = self.append(level, message) {
            warn!(
                "Failed to write memory journal {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Stand-in memory that prints entries to stdout
#[derive(Debug, Default)]
pub struct ConsoleMemory;

impl Memory for ConsoleMemory {
    fn log(&self, level: MemoryLevel, message: &str) {
        println!("[{}] {}", level, message);
    }
}

/// Pick the journal when the storage location is usable, else the console stand-in
pub fn open_memory(db_path: &Path) -> Arc<dyn Memory> {
    match JournalMemory::open(db_path) {
        Ok(journal) => {
            debug!(
                "Memory journal at {} (run {})",
                journal.path().display(),
                journal.run_id()
            );
            Arc::new(journal)
        }
        Err(e) => {
            warn!(
                "Memory storage {} unavailable ({}), falling back to console memory",
                db_path.display(),
                e
            );
            Arc::new(ConsoleMemory)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(MemoryLevel::Warning.to_string(), "WARNING");
        assert_eq!(MemoryLevel::Error.as_str(), "ERROR");
    }

    #[test]
    fn test_journal_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");

        let journal = JournalMemory::open(&path).unwrap();
        journal.log(MemoryLevel::Info, "first");
        journal.log(MemoryLevel::Error, "Loop error: boom");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["message"], "first");
        assert_eq!(lines[1]["level"], "ERROR");
        assert_eq!(lines[0]["run_id"], lines[1]["run_id"]);
        assert_eq!(lines[0]["run_id"], journal.run_id().to_string());
    }

    #[test]
    fn test_open_memory_falls_back_when_storage_unusable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the journal file
        let memory = open_memory(dir.path());
        memory.log(MemoryLevel::Info, "still works");
    }
}
