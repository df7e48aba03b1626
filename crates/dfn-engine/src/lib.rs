//! Reference-resolution and incremental re-execution planning engine.
//!
//! Raw cell text flows through the transformer to produce grounded,
//! display, and persistent forms; the extractor records which exporters
//! a cell's grounded code targets; after a run, the planner detects
//! tag-ownership reassignments, propagates impact through the recorded
//! references, and classifies each impacted cell as update-only or
//! execute-needed.

pub mod equiv;
pub mod error;
pub mod extract;
pub mod plan;
pub mod scan;
pub mod state;
pub mod transform;

pub use equiv::code_equivalent;
pub use error::ScanError;
pub use extract::references;
pub use plan::{PlanOutcome, PlanRequest, Planner};
pub use state::{DataflowState, RefLinks, RefTable, Reversion, ReversionMap};
