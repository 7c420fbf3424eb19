//! Size-rotated log files.
//!
//! Files are opened lazily on the first write. Before every write the open
//! file is checked against the path on disk: if it was deleted or replaced
//! (different inode) a fresh file is started, header included. A file is
//! closed with the layout footer once it reaches the size threshold.

use crate::session::types::SessionError;
use crate::session::writer::LogLayout;
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Source of the timestamps used in file names
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// `Log_<group>_<YYYY-MM-DD>_<HHhMMmSSs>.<ext>`
pub fn log_file_name(groupname: &str, at: NaiveDateTime, extension: &str) -> String {
    let group: String = groupname
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!(
        "Log_{}_{}.{}",
        group,
        at.format("%Y-%m-%d_%Hh%Mm%Ss"),
        extension
    )
}

#[cfg(unix)]
fn inode(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn inode(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

struct OpenLog {
    path: PathBuf,
    writer: BufWriter<File>,
    inode: Option<u64>,
    size: u64,
    records: u64,
}

pub struct RotatingLogFile {
    directory: PathBuf,
    groupname: String,
    layout: LogLayout,
    max_file_size: u64,
    clock: Box<dyn Clock>,
    current: Option<OpenLog>,
    /// Files closed so far, oldest first
    closed: Vec<PathBuf>,
}

impl RotatingLogFile {
    pub fn new(
        directory: impl Into<PathBuf>,
        groupname: impl Into<String>,
        layout: LogLayout,
        max_file_size: u64,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            directory: directory.into(),
            groupname: groupname.into(),
            layout,
            max_file_size,
            clock,
            current: None,
            closed: Vec::new(),
        }
    }

    /// Path of the file currently open
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    pub fn closed_files(&self) -> &[PathBuf] {
        &self.closed
    }

    /// Create the log directory
    pub fn ensure_directory(&self) -> Result<(), SessionError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| {
            SessionError::CreateDirectory {
                path: self.directory.clone(),
                source,
            }
        })
    }

    /// Append one record, opening or rotating files as needed
    pub fn write_record(&mut self, record: &str) -> Result<(), SessionError> {
        self.check_current();
        if self.current.is_none() {
            self.current = Some(self.open_new()?);
        }
        let separator = self.layout.separator;
        let max_file_size = self.max_file_size;

        let Some(log) = self.current.as_mut() else {
            return Ok(());
        };
        let prefix = if log.records > 0 { separator } else { "" };
        let written = log
            .writer
            .write_all(prefix.as_bytes())
            .and_then(|_| log.writer.write_all(record.as_bytes()))
            .and_then(|_| log.writer.flush());
        if let Err(source) = written {
            let path = log.path.clone();
            self.current = None;
            return Err(SessionError::Append { path, source });
        }
        log.size += (prefix.len() + record.len()) as u64;
        log.records += 1;

        if log.size >= max_file_size {
            tracing::info!(path = ?log.path, size = log.size, "Log file reached size limit");
            self.finish()?;
        }
        Ok(())
    }

    /// Close the current file with the layout footer
    pub fn finish(&mut self) -> Result<(), SessionError> {
        let Some(mut log) = self.current.take() else {
            return Ok(());
        };
        let footer = self.layout.footer;
        let result = log
            .writer
            .write_all(footer.as_bytes())
            .and_then(|_| log.writer.flush());
        tracing::debug!(path = ?log.path, records = log.records, "Closed log file");
        self.closed.push(log.path.clone());
        result.map_err(|source| SessionError::Append {
            path: log.path,
            source,
        })
    }

    /// Forget the open file if it no longer is the one on disk
    fn check_current(&mut self) {
        let Some(log) = self.current.as_ref() else {
            return;
        };
        let replaced = match std::fs::metadata(&log.path) {
            Ok(metadata) => log.inode.is_some() && inode(&metadata) != log.inode,
            Err(_) => true,
        };
        if replaced {
            tracing::warn!(path = ?log.path, "Log file disappeared, starting a new one");
            self.current = None;
        }
    }

    fn next_path(&self) -> PathBuf {
        let name = log_file_name(&self.groupname, self.clock.now(), self.layout.extension);
        let candidate = self.directory.join(&name);
        if !candidate.exists() {
            return candidate;
        }
        let stem = name
            .strip_suffix(&format!(".{}", self.layout.extension))
            .unwrap_or(&name)
            .to_string();
        (1u32..)
            .map(|n| {
                self.directory
                    .join(format!("{}_{}.{}", stem, n, self.layout.extension))
            })
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }

    fn open_new(&self) -> Result<OpenLog, SessionError> {
        self.ensure_directory()?;
        let path = self.next_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SessionError::Open {
                path: path.clone(),
                source,
            })?;
        let inode = file.metadata().ok().as_ref().and_then(inode);

        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.layout.header.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| SessionError::Append {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = ?path, "Opened log file");

        Ok(OpenLog {
            path,
            writer,
            inode,
            size: self.layout.header.len() as u64,
            records: 0,
        })
    }
}

impl Drop for RotatingLogFile {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("Failed to close log file: {}", e);
        }
    }
}
