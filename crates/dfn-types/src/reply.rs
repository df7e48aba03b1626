use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{CellId, RefHistory, TagName};

/// Result of the external shell's run primitive for one cell.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    /// Authoritative post-run owner sets, keyed by tag. A tag mapped to
    /// an empty set is treated as retired.
    #[serde(default)]
    pub exported: BTreeMap<TagName, BTreeSet<CellId>>,
    /// Cells the shell reports as deleted; passed through, never
    /// interpreted by the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_cells: Vec<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl RunOutcome {
    pub fn ok(exported: BTreeMap<TagName, BTreeSet<CellId>>) -> Self {
        RunOutcome {
            success: true,
            exported,
            deleted_cells: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: RunError) -> Self {
        RunOutcome {
            success: false,
            exported: BTreeMap::new(),
            deleted_cells: Vec::new(),
            error: Some(error),
        }
    }
}

/// Structured execution failure reported by the shell.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunError {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Reply envelope handed back to the protocol layer after a cycle.
///
/// `identifier_refs` and `persistent_code` are attached verbatim for
/// client consumption; the shell's error triple rides along unchanged
/// on failure.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    pub execution_count: u64,
    #[serde(default)]
    pub identifier_refs: RefHistory,
    #[serde(default)]
    pub persistent_code: BTreeMap<CellId, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_cells: Vec<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}
