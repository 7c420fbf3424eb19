//! Log sessions
//!
//! This module persists flushed batches to disk on a dedicated worker thread.
//! A session writes one group's outputs in one of three formats and rotates
//! files by size.
//!
//! # Features
//!
//! - `stcm` JSON arrays, long-form CSV and column CSV
//! - Change-only logging
//! - Locale-dependent CSV separators, fixed per session
//! - Recovery from log files deleted or replaced while open

pub mod rotation;
pub mod types;
pub mod worker;
pub mod writer;

pub use rotation::{log_file_name, Clock, RotatingLogFile, SystemClock};
pub use types::{ErrorReport, LogSessionConfig, SessionError};
pub use worker::{LogCommand, LogWorker, LogWorkerHandle};
pub use writer::{ChangeFilter, EncoderCheckpoint, LogEncoder, LogLayout};
