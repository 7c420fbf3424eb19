//! Encoding of batches into log file records.
//!
//! Three formats are supported:
//!
//! - `stcm`: a JSON array with one `{"groupname","variablename","variabledata"}`
//!   record per output and flush
//! - `csv`: one `groupname,variablename,x,y` row per point
//! - `csvc`: one `time,<var1>,<var2>,...` row per sample time
//!
//! CSV times are seconds elapsed since the first logged point. The field
//! delimiter and decimal separator are fixed when the encoder is created.

use crate::config::{LogFormat, LogMode};
use crate::pipeline::packet::{Batch, Frame, OutputBuffer};
use crate::session::types::{LogSessionConfig, SessionError};
use crate::types::Sample;
use std::collections::HashMap;

/// Fixed text framing the records of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    /// Written when a file is created
    pub header: String,
    /// Written between two records of the same file
    pub separator: &'static str,
    /// Written when a file is closed
    pub footer: &'static str,
    pub extension: &'static str,
}

/// Drops values equal to the last logged value of the same output
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    last: HashMap<String, f64>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `y` should be logged for `name`; records it if so
    pub fn retain(&mut self, name: &str, y: f64) -> bool {
        match self.last.get_mut(name) {
            Some(last) if *last == y => false,
            Some(last) => {
                *last = y;
                true
            }
            None => {
                self.last.insert(name.to_string(), y);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}

/// Encoder state that a failed write must not advance
#[derive(Debug, Clone)]
pub struct EncoderCheckpoint {
    origin: Option<f64>,
    changes: ChangeFilter,
    last_row: Vec<Option<f64>>,
}

pub struct LogEncoder {
    groupname: String,
    format: LogFormat,
    mode: LogMode,
    variables: Vec<String>,
    delimiter: char,
    decimal: char,
    /// Timestamp (ms) of the first logged point
    origin: Option<f64>,
    changes: ChangeFilter,
    /// Last defined value of each csvc column
    last_row: Vec<Option<f64>>,
}

impl LogEncoder {
    pub fn new(config: &LogSessionConfig) -> Self {
        let style = config.decimal_style.resolve();
        Self {
            groupname: config.groupname.clone(),
            format: config.format,
            mode: config.mode,
            variables: config.variables.clone(),
            delimiter: style.delimiter(),
            decimal: style.decimal_separator(),
            origin: None,
            changes: ChangeFilter::new(),
            last_row: vec![None; config.variables.len()],
        }
    }

    pub fn layout(&self) -> LogLayout {
        let d = self.delimiter;
        match self.format {
            LogFormat::Stcm => LogLayout {
                header: "[\n".to_string(),
                separator: ",\n",
                footer: "\n]\n",
                extension: self.format.extension(),
            },
            LogFormat::Csv => LogLayout {
                header: format!("groupname{d}variablename{d}x{d}y\n"),
                separator: "",
                footer: "",
                extension: self.format.extension(),
            },
            LogFormat::Csvc => {
                let mut header = String::from("time");
                for name in &self.variables {
                    header.push(d);
                    header.push_str(name);
                }
                header.push('\n');
                LogLayout {
                    header,
                    separator: "",
                    footer: "",
                    extension: self.format.extension(),
                }
            }
        }
    }

    /// Restart elapsed time at the next logged point
    pub fn reset_origin(&mut self) {
        self.origin = None;
    }

    /// Capture the state advanced by `encode`
    pub fn checkpoint(&self) -> EncoderCheckpoint {
        EncoderCheckpoint {
            origin: self.origin,
            changes: self.changes.clone(),
            last_row: self.last_row.clone(),
        }
    }

    /// Return to a captured state, so the points of an unwritten batch count
    /// as not logged
    pub fn restore(&mut self, checkpoint: EncoderCheckpoint) {
        self.origin = checkpoint.origin;
        self.changes = checkpoint.changes;
        self.last_row = checkpoint.last_row;
    }

    /// Turn a batch into records, applying change filtering
    pub fn encode(&mut self, batch: &Batch) -> Result<Vec<String>, SessionError> {
        match self.format {
            LogFormat::Stcm => self.encode_stcm(&batch.buffers),
            LogFormat::Csv => Ok(self.encode_csv(&batch.buffers)),
            LogFormat::Csvc => Ok(self.encode_columns(&batch.frames)),
        }
    }

    fn filtered(&mut self, buffer: &OutputBuffer) -> Vec<Sample> {
        let only_changes = self.mode == LogMode::Changes;
        buffer
            .points
            .iter()
            .filter(|p| match p.value() {
                Some(y) => !only_changes || self.changes.retain(&buffer.name, y),
                None => false,
            })
            .copied()
            .collect()
    }

    fn encode_stcm(&mut self, buffers: &[OutputBuffer]) -> Result<Vec<String>, SessionError> {
        let mut records = Vec::new();
        for buffer in buffers {
            let points = self.filtered(buffer);
            if points.is_empty() {
                continue;
            }
            let record = OutputBuffer {
                groupname: buffer.groupname.clone(),
                name: buffer.name.clone(),
                points,
            };
            records.push(serde_json::to_string(&record)?);
        }
        Ok(records)
    }

    fn encode_csv(&mut self, buffers: &[OutputBuffer]) -> Vec<String> {
        let d = self.delimiter;
        let mut records = Vec::new();
        for buffer in buffers {
            let points = self.filtered(buffer);
            let Some(first) = points.first() else {
                continue;
            };
            let origin = *self.origin.get_or_insert(first.x);

            let mut rows = String::new();
            for point in &points {
                let Some(y) = point.value() else { continue };
                rows.push_str(&format!(
                    "{}{d}{}{d}{}{d}{}\n",
                    self.groupname,
                    buffer.name,
                    self.number((point.x - origin) / 1000.0),
                    self.number(y),
                ));
            }
            records.push(rows);
        }
        records
    }

    fn encode_columns(&mut self, frames: &[Frame]) -> Vec<String> {
        let d = self.delimiter;
        let mut records = Vec::new();
        for frame in frames {
            let origin = *self.origin.get_or_insert(frame.x);
            let mut row = self.number((frame.x - origin) / 1000.0);
            let mut changed = false;

            for (column, value) in frame.values.iter().enumerate() {
                row.push(d);
                match value {
                    Some(y) => {
                        row.push_str(&self.number(*y));
                        if let Some(last) = self.last_row.get_mut(column) {
                            changed |= *last != Some(*y);
                            *last = Some(*y);
                        }
                    }
                    None => row.push('0'),
                }
            }
            row.push('\n');

            if self.mode != LogMode::Changes || changed {
                records.push(row);
            }
        }
        records
    }

    fn number(&self, value: f64) -> String {
        let text = value.to_string();
        if self.decimal == '.' {
            text
        } else {
            text.replace('.', &self.decimal.to_string())
        }
    }
}
