//! Append-only line logs

use crate::error::StorageResult;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Line-oriented, append-only persistence.
///
/// A line handed to [`AppendLog::append`] must not contain `\n`.
pub trait AppendLog: Send + Sync {
    /// Every non-empty line written so far, oldest first
    fn read_lines(&self) -> StorageResult<Vec<String>>;

    /// Durably append one line
    fn append(&self, line: &str) -> StorageResult<()>;
}

/// Log backed by a text file, one record per line.
pub struct FileLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLog {
    /// Open (creating if missing) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AppendLog for FileLog {
    fn read_lines(&self) -> StorageResult<Vec<String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn append(&self, line: &str) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.write_all(format!("{}\n", line).as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// In-memory log, used by tests and ephemeral nodes.
#[derive(Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that already holds `lines`
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }

    /// Number of lines appended
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Check if nothing was appended
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl AppendLog for MemoryLog {
    fn read_lines(&self) -> StorageResult<Vec<String>> {
        Ok(self.lines.lock().clone())
    }

    fn append(&self, line: &str) -> StorageResult<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}
