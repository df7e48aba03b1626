use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CellId, RefHistory, TagName};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("bad execute request payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("execute request has empty code")]
    EmptyCode,
}

/// Validated per-cycle request metadata.
///
/// The front end ships this alongside the raw cell source; every field
/// the engine consumes is named and typed here, and missing required
/// fields fail at the boundary instead of defaulting deep inside the
/// planner.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExecuteRequest {
    /// Raw source text of the submitted cell.
    pub code: String,
    /// Execution counter assigned to the submitted cell.
    #[serde(rename = "uuid")]
    pub cell: CellId,
    /// Per-cell renaming table: alias -> tag it stands for.
    #[serde(default)]
    pub input_tags: BTreeMap<String, TagName>,
    /// Client-declared exports: cell -> tags it intends to export.
    pub output_tags: BTreeMap<CellId, BTreeSet<TagName>>,
    /// Last-agreed display code per cell.
    pub code_dict: BTreeMap<CellId, String>,
    /// Last-agreed canonical code per cell, used only for equivalence.
    pub persisted_code: BTreeMap<CellId, String>,
    /// Externally persisted copy of the identifier reference table.
    pub all_refs: RefHistory,
}

impl ExecuteRequest {
    /// Parse and validate a request out of a raw JSON payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RequestError> {
        let request: ExecuteRequest = serde_json::from_value(value)?;
        if request.code.trim().is_empty() {
            return Err(RequestError::EmptyCode);
        }
        Ok(request)
    }
}
