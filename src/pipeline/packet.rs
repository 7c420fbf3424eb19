//! Data units flowing out of the pipeline.
//!
//! An [`OutputBuffer`] collects the points of one output (variable,
//! statistic or expression) between two ticks. Its serialized form is the
//! record written to `.stcm` files.

use crate::types::Sample;
use serde::{Deserialize, Serialize};

/// Points of one output accumulated since the last flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBuffer {
    pub groupname: String,
    #[serde(rename = "variablename")]
    pub name: String,
    #[serde(rename = "variabledata")]
    pub points: Vec<Sample>,
}

impl OutputBuffer {
    pub fn new(groupname: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            groupname: groupname.into(),
            name: name.into(),
            points: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, x: f64, y: f64) {
        self.points.push(Sample::new(x, y));
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// A copy carrying the points, leaving this buffer empty
    pub fn take(&mut self) -> OutputBuffer {
        OutputBuffer {
            groupname: self.groupname.clone(),
            name: self.name.clone(),
            points: std::mem::take(&mut self.points),
        }
    }
}

/// Values of every variable at one sample time, absent ones included
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub values: Vec<Option<f64>>,
}

/// Everything flushed on one tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    /// Non-empty output buffers in output order
    pub buffers: Vec<OutputBuffer>,
    /// Variable rows in arrival order
    pub frames: Vec<Frame>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.frames.is_empty()
    }
}
