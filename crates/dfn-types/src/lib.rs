//! Boundary types shared by the dataflow engine and the kernel orchestrator.

mod ids;
mod reply;
mod request;

use std::collections::{BTreeMap, BTreeSet};

pub use ids::{CellId, IdError, TagName};
pub use reply::{ExecuteReply, ReplyStatus, RunError, RunOutcome};
pub use request::{ExecuteRequest, RequestError};

/// References resolved for one cell: tag -> owners bound at grounding time.
pub type RefMap = BTreeMap<TagName, BTreeSet<CellId>>;

/// Cross-session copy of the identifier reference table: cell -> its `RefMap`.
pub type RefHistory = BTreeMap<CellId, RefMap>;
