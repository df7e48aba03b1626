use std::collections::BTreeMap;

use dfn_types::CellId;

/// Live channel for pushing refreshed cell code back to the front end.
///
/// Receives exactly one batched payload per successful cycle, keyed by
/// cell id, covering every update-only and execute-needed cell.
pub trait CodeSink {
    fn publish(&mut self, updates: &BTreeMap<CellId, String>);
}

/// Sink that drops every batch; for headless or embedded use.
#[derive(Debug, Default)]
pub struct NullSink;

impl CodeSink for NullSink {
    fn publish(&mut self, _updates: &BTreeMap<CellId, String>) {}
}
