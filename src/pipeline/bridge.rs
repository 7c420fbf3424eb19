//! Thread boundary between the caller and the processing worker.
//!
//! `ProcessingBridge` owns the caller's ends of the two bounded channels:
//! commands go in, [`SinkMessage`]s come out. Sends block when the worker
//! falls behind.

use crate::config::{ProcessingConfig, VariableGroupLink, DEFAULT_CHANNEL_CAPACITY};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::Pipeline;
use crate::pipeline::packet::OutputBuffer;
use crate::session::types::ErrorReport;
use crate::session::worker::LogWorkerHandle;
use crate::types::SampleGroup;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

/// Severity hint of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSeverity {
    Ok,
    Degraded,
    Off,
}

/// Human-readable processing state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingStatus {
    pub severity: StatusSeverity,
    pub text: String,
}

impl ProcessingStatus {
    pub fn new(severity: StatusSeverity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

/// Messages sent from the pipeline to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "data", rename_all = "snake_case")]
pub enum SinkMessage {
    /// Non-empty output buffers flushed on one tick.
    Data(Vec<OutputBuffer>),

    /// A gated run started at this timestamp; data follows once the trigger passes.
    RunStarted { x: f64 },

    Status(ProcessingStatus),

    /// Non-fatal processing problem.
    Warning(String),

    /// Log file failure.
    Error(ErrorReport),

    /// Pipeline is shutting down.
    Shutdown,
}

/// Commands sent from the caller to the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// (Re)build the outputs from a configuration and its linked group.
    Initialize {
        config: Box<ProcessingConfig>,
        /// Log directory; the home directory when `None`
        directory: Option<PathBuf>,
        linked: Option<VariableGroupLink>,
    },
    /// One acquisition of a group.
    Input(SampleGroup),
    /// Finalize the current log file.
    Stop,
    /// Reset the log time origin.
    Clear,
    /// Shut down the pipeline thread.
    Shutdown,
}

/// Caller-side handle for communicating with the pipeline thread.
pub struct ProcessingBridge {
    pub cmd_tx: Sender<PipelineCommand>,
    pub msg_rx: Receiver<SinkMessage>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessingBridge {
    /// Create a new bridge pair: `(bridge, cmd_rx, msg_tx)`.
    ///
    /// The pipeline thread owns `cmd_rx` and `msg_tx`.
    pub fn new(capacity: usize) -> (Self, Receiver<PipelineCommand>, Sender<SinkMessage>) {
        let (cmd_tx, cmd_rx) = bounded(capacity);
        let (msg_tx, msg_rx) = bounded(capacity);
        (
            Self {
                cmd_tx,
                msg_rx,
                handle: None,
            },
            cmd_rx,
            msg_tx,
        )
    }

    /// Spawn the processing and logging workers
    pub fn spawn(capacity: usize) -> PipelineResult<Self> {
        let (mut bridge, cmd_rx, msg_tx) = Self::new(capacity);
        let log = LogWorkerHandle::spawn(msg_tx.clone(), capacity)?;

        let handle = std::thread::Builder::new()
            .name("varlog-pipeline".to_string())
            .spawn(move || Pipeline::new(cmd_rx, msg_tx, log).run())
            .map_err(|source| PipelineError::Spawn {
                name: "pipeline",
                source,
            })?;
        bridge.handle = Some(handle);
        Ok(bridge)
    }

    /// Spawn with the default channel capacity
    pub fn spawn_default() -> PipelineResult<Self> {
        Self::spawn(DEFAULT_CHANNEL_CAPACITY)
    }

    // --- Drain messages ---

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<SinkMessage> {
        self.msg_rx.try_iter().collect()
    }

    /// Try to receive a single message without blocking.
    pub fn try_recv(&self) -> Option<SinkMessage> {
        self.msg_rx.try_recv().ok()
    }

    /// Wait for a message up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> PipelineResult<Option<SinkMessage>> {
        match self.msg_rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::ChannelRecv),
        }
    }

    // --- Commands ---

    pub fn send_command(&self, cmd: PipelineCommand) -> PipelineResult<()> {
        self.cmd_tx.send(cmd).map_err(|_| PipelineError::ChannelSend)
    }

    pub fn initialize(
        &self,
        config: ProcessingConfig,
        directory: Option<PathBuf>,
        linked: Option<VariableGroupLink>,
    ) -> PipelineResult<()> {
        self.send_command(PipelineCommand::Initialize {
            config: Box::new(config),
            directory,
            linked,
        })
    }

    pub fn input(&self, group: SampleGroup) -> PipelineResult<()> {
        self.send_command(PipelineCommand::Input(group))
    }

    pub fn stop(&self) -> PipelineResult<()> {
        self.send_command(PipelineCommand::Stop)
    }

    pub fn clear(&self) -> PipelineResult<()> {
        self.send_command(PipelineCommand::Clear)
    }

    /// Ask the pipeline to stop and wait for its thread.
    ///
    /// Messages still queued remain readable from `msg_rx`.
    pub fn shutdown(&mut self) -> PipelineResult<()> {
        // The thread may already be gone; joining below reports a panic.
        let _ = self.cmd_tx.send(PipelineCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| PipelineError::WorkerPanicked("pipeline"))?;
        }
        Ok(())
    }
}

impl Drop for ProcessingBridge {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::warn!("Pipeline shutdown failed: {}", e);
            }
        }
    }
}
