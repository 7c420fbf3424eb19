//! Sample processing pipeline.
//!
//! Sample groups flow through a fixed chain: trigger gate → statistics →
//! expressions → batch emitter. The pipeline runs on a dedicated thread and
//! talks to the caller and to the log worker over bounded crossbeam channels.
//!
//! # Architecture
//!
//! ```text
//! caller ──PipelineCommand──► [Pipeline] ──LogCommand──► [LogWorker] ──► files
//!    ▲                             │                          │
//!    └────────SinkMessage──────────┴──────────────────────────┘
//! ```
//!
//! # Design
//!
//! - **Owned state**: statistics, gate and buffers live on the pipeline thread only.
//! - **Typed messages**: every channel carries an exhaustively matched enum.
//! - **Lazy timer**: the batch tick runs only while output is accumulating.

pub mod batch;
pub mod bridge;
pub mod error;
pub mod executor;
pub mod expression;
pub mod packet;
pub mod statistics;
pub mod trigger;

pub use batch::{BatchEmitter, TickOutcome};
pub use bridge::{
    PipelineCommand, ProcessingBridge, ProcessingStatus, SinkMessage, StatusSeverity,
};
pub use error::{PipelineError, PipelineResult};
pub use executor::Pipeline;
pub use expression::{validate_expression, Validation};
pub use packet::{Batch, Frame, OutputBuffer};
pub use statistics::{RunningState, Statistic, StatisticOutcome, StatisticsEngine};
pub use trigger::{GateState, RunStart, TriggerGate};
