//! Core data types for varlog-rs
//!
//! This module contains the fundamental data structures shared by the
//! processing pipeline and the log writer.
//!
//! # Main Types
//!
//! - [`VariableType`] - Enum of supported variable types (u8, u16, u32, f32, etc.)
//! - [`Variable`] - One measured quantity of a group
//! - [`Sample`] - A single timestamped value (`x` in milliseconds, `y` optional)
//! - [`SampleGroup`] - One acquisition of every variable of a group at one instant

use serde::{Deserialize, Serialize};

/// Represents the type of a variable being observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    #[default]
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::U8 => write!(f, "u8"),
            VariableType::U16 => write!(f, "u16"),
            VariableType::U32 => write!(f, "u32"),
            VariableType::U64 => write!(f, "u64"),
            VariableType::I8 => write!(f, "i8"),
            VariableType::I16 => write!(f, "i16"),
            VariableType::I32 => write!(f, "i32"),
            VariableType::I64 => write!(f, "i64"),
            VariableType::F32 => write!(f, "f32"),
            VariableType::F64 => write!(f, "f64"),
        }
    }
}

/// A variable observed as part of a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Name as shown to the operator and used in formulas
    pub name: String,

    /// Data type on the target
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
}

impl Variable {
    /// Create a new variable
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
        }
    }
}

/// A single timestamped value.
///
/// `x` is a timestamp in milliseconds. `y` is absent when the probe could not
/// produce a value for this instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl Sample {
    /// Create a sample carrying a value
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y: Some(y) }
    }

    /// Create a sample with no value (a gap)
    pub fn gap(x: f64) -> Self {
        Self { x, y: None }
    }

    /// The usable value of this sample. NaN counts as absent.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        self.y.filter(|y| !y.is_nan())
    }
}

/// One acquisition of a group: one sample per variable, in configuration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleGroup {
    /// Group this acquisition belongs to
    pub groupname: String,

    /// True for the first group of a new acquisition run
    #[serde(default)]
    pub first: bool,

    /// One sample per variable
    pub samples: Vec<Sample>,
}

impl SampleGroup {
    pub fn new(groupname: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            groupname: groupname.into(),
            first: false,
            samples,
        }
    }

    /// Mark this group as the first of a run
    pub fn with_first(mut self, first: bool) -> Self {
        self.first = first;
        self
    }

    /// Timestamp of the first variable's sample
    pub fn timestamp(&self) -> Option<f64> {
        self.samples.first().map(|s| s.x)
    }
}
