//! Log session data types

use crate::config::{DecimalStyle, LogFormat, LogMode, DEFAULT_MAX_FILE_SIZE};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Everything the log worker needs to write one group's files
#[derive(Debug, Clone, PartialEq)]
pub struct LogSessionConfig {
    pub directory: PathBuf,
    pub groupname: String,
    pub mode: LogMode,
    pub format: LogFormat,
    /// Variable names, in column order
    pub variables: Vec<String>,
    pub decimal_style: DecimalStyle,
    /// Size at which the current file is closed and a new one started
    pub max_file_size: u64,
}

impl LogSessionConfig {
    pub fn new(directory: impl Into<PathBuf>, groupname: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            groupname: groupname.into(),
            mode: LogMode::Full,
            format: LogFormat::Stcm,
            variables: Vec::new(),
            decimal_style: DecimalStyle::Point,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_format(mut self, mode: LogMode, format: LogFormat) -> Self {
        self.mode = mode;
        self.format = format;
        self
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_decimal_style(mut self, style: DecimalStyle) -> Self {
        self.decimal_style = style;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }
}

/// Error description sent to the caller when logging fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "msg")]
    pub message: String,
}

/// Errors raised while writing log files
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to create log directory {path:?}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to log file {path:?}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    /// Operator-facing description of this error
    pub fn report(&self) -> ErrorReport {
        match self {
            SessionError::CreateDirectory { path, source } => ErrorReport {
                title: "Cannot create log directory".to_string(),
                kind: source.to_string(),
                message: path.display().to_string(),
            },
            SessionError::Open { path, source } => ErrorReport {
                title: "Cannot open log file".to_string(),
                kind: source.to_string(),
                message: path.display().to_string(),
            },
            SessionError::Append { path, source } => ErrorReport {
                title: "Cannot write log file".to_string(),
                kind: source.to_string(),
                message: path.display().to_string(),
            },
            SessionError::Encode(e) => ErrorReport {
                title: "Cannot encode log record".to_string(),
                kind: "encode".to_string(),
                message: e.to_string(),
            },
        }
    }
}
