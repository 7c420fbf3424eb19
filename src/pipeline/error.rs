//! Pipeline-specific error types.

use thiserror::Error;

/// Errors that can occur while driving the pipeline workers.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(&'static str),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelRecv,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl From<PipelineError> for crate::error::VarLogError {
    fn from(err: PipelineError) -> Self {
        crate::error::VarLogError::Channel(err.to_string())
    }
}
