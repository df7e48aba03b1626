//! Execution orchestrator for the dataflow notebook engine.
//!
//! Sequences one execute cycle at a time: transform the submitted
//! cell, delegate the run to the external shell, then plan which other
//! cells are impacted and push their refreshed code through the live
//! channel.

mod comm;
mod error;
mod session;
mod shell;

pub use comm::{CodeSink, NullSink};
pub use error::KernelError;
pub use session::{ExecuteOutcome, Session};
pub use shell::Shell;
