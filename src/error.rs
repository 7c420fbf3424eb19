//! Error handling for varlog-rs
//!
//! This module defines the crate-level error type and a Result alias.
//! Worker-local failures never surface through this type at runtime; they are
//! turned into warning/error messages on the output channel. `VarLogError` is
//! for setup paths (loading configuration, spawning workers, compiling
//! formulas) where the caller can still react.

use thiserror::Error;

/// Main error type for varlog-rs operations
#[derive(Error, Debug)]
pub enum VarLogError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while compiling or evaluating a formula
    #[error("Formula error: {0}")]
    Formula(String),

    /// A formula was rejected by the validator
    #[error("Validation error: {0}")]
    Validation(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VarLogError>,
    },
}

impl VarLogError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VarLogError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a formula error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        VarLogError::Formula(err.to_string())
    }
}

impl From<serde_json::Error> for VarLogError {
    fn from(err: serde_json::Error) -> Self {
        VarLogError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for VarLogError {
    fn from(err: toml::de::Error) -> Self {
        VarLogError::Config(err.to_string())
    }
}

/// Result type alias for varlog-rs operations
pub type Result<T> = std::result::Result<T, VarLogError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VarLogError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VarLogError::from_rhai_error(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VarLogError::Validation("Variable not found: Foo".to_string());
        assert_eq!(err.to_string(), "Validation error: Variable not found: Foo");
    }

    #[test]
    fn test_error_with_context() {
        let err = VarLogError::Config("missing group name".to_string());
        let with_ctx = err.with_context("Failed to load processing.toml");
        assert!(with_ctx.to_string().contains("Failed to load processing.toml"));
        assert!(with_ctx.to_string().contains("missing group name"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: VarLogError = io.into();
        assert!(matches!(err, VarLogError::Io(_)));
    }
}
