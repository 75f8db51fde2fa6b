//! Append-only newline-delimited JSON files.

use ops_sentinel_core::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Serialized appender for one JSONL file.
///
/// Each record is encoded up front and written with a single `write_all`
/// followed by a flush while the file lock is held, so concurrent writers
/// never interleave partial lines.
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlWriter {
    /// Open `path` for appending, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::storage(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::storage(format!("Failed to open {}: {}", path.display(), e)))?;
        terminate_torn_tail(&mut file, &path)?;

        debug!(path = %path.display(), "Opened JSONL log");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record as a single line
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.lock()?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Force written data to disk
    pub fn sync(&self) -> Result<()> {
        let file = self.lock()?;
        file.sync_data()?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| {
            Error::storage(format!("Writer lock poisoned for {}", self.path.display()))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Close a partial last line left by a crash so the next append starts on a
/// fresh line. Only the torn record is lost.
fn terminate_torn_tail(file: &mut File, path: &Path) -> Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!(path = %path.display(), "Log ends with a partial line, terminating it");
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        if let Ok(file) = self.file.get_mut() {
            if let Err(e) = file.sync_data() {
                warn!(path = %self.path.display(), error = %e, "Failed to sync JSONL log on close");
            }
        }
    }
}

/// Result of scanning a JSONL file
#[derive(Debug, Clone)]
pub struct Scan<T> {
    /// Successfully decoded records, in file order
    pub records: Vec<T>,
    /// Lines read, including blank and malformed ones
    pub lines_read: usize,
    /// Malformed lines that were skipped
    pub skipped: usize,
}

impl<T> Default for Scan<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            lines_read: 0,
            skipped: 0,
        }
    }
}

/// Read up to `limit` lines of `path`, decoding each independently.
///
/// Blank lines are ignored and malformed lines are skipped one by one; a
/// missing file yields an empty scan.
pub fn scan<T: DeserializeOwned>(path: impl AsRef<Path>, limit: usize) -> Result<Scan<T>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Scan::default()),
        Err(e) => {
            return Err(Error::storage(format!("Failed to open {}: {}", path.display(), e)));
        }
    };

    let mut scan = Scan::default();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        if lineno >= limit {
            break;
        }
        scan.lines_read += 1;

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Unreadable line skipped"
                );
                scan.skipped += 1;
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(line) {
            Ok(record) => scan.records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Malformed record skipped"
                );
                scan.skipped += 1;
            }
        }
    }

    Ok(scan)
}
