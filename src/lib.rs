//! # varlog-rs: processing and logging of sampled target variables
//!
//! Sample groups acquired from an embedded target are turned into output
//! streams (the raw variables, running statistics and user formulas), batched
//! on a fixed tick and optionally written to rotating log files.
//!
//! ## Architecture
//!
//! - **Pipeline**: trigger gating, statistics and expressions on a worker thread
//! - **Scripting**: Rhai-based formula evaluation with 64-bit bitwise operators
//! - **Session**: log file encoding and rotation on a second worker thread
//! - **Communication**: Crossbeam channels for thread-safe data transfer
//!
//! ## Example
//!
//! ```no_run
//! use varlog_rs::{
//!     config::{ProcessingConfig, VariableGroupLink},
//!     pipeline::ProcessingBridge,
//!     types::{Sample, SampleGroup, Variable, VariableType},
//! };
//!
//! # fn main() -> varlog_rs::Result<()> {
//! let bridge = ProcessingBridge::spawn_default()?;
//! let link = VariableGroupLink::new("g1", "motor")
//!     .with_variables(vec![Variable::new("speed", VariableType::F32)]);
//!
//! bridge.initialize(ProcessingConfig::new("motor"), None, Some(link))?;
//! bridge.input(SampleGroup::new("motor", vec![Sample::new(0.0, 12.5)]).with_first(true))?;
//!
//! for msg in bridge.drain() {
//!     println!("{:?}", msg);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod scripting;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::{ProcessingConfig, SessionFile, VariableGroupLink};
pub use error::{Result, VarLogError};
pub use pipeline::{ProcessingBridge, SinkMessage};
pub use scripting::FormulaEngine;
pub use types::{Sample, SampleGroup, Variable, VariableType};
