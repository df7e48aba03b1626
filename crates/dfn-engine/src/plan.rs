//! Incremental re-execution planning after a successful cell run.
//!
//! Single pass, four stages: detect tag-ownership reassignments from
//! the declared-export snapshot, merge externally persisted reference
//! history, propagate impact through the reference table, then
//! re-resolve each impacted cell and classify it as update-only or
//! execute-needed. All intermediate and output collections are ordered,
//! so the classification never depends on set iteration order.

use std::collections::{BTreeMap, BTreeSet};

use dfn_types::{CellId, RefHistory};

use crate::equiv;
use crate::state::{DataflowState, RefLinks, RefTable, Reversion, ReversionMap};
use crate::transform::{self, TagAliases};

/// Per-cycle inputs the planner consumes read-only.
pub struct PlanRequest<'a> {
    /// The cell whose run just completed.
    pub cell: CellId,
    pub input_tags: &'a TagAliases,
    /// Externally persisted copy of the reference table.
    pub history: &'a RefHistory,
    /// Last-agreed display code per cell.
    pub code_dict: &'a BTreeMap<CellId, String>,
    /// Last-agreed canonical code per cell.
    pub persisted_code: &'a BTreeMap<CellId, String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Impacted cells whose re-resolved code is semantically unchanged;
    /// only their stored/displayed text needs refreshing.
    pub cells_to_update: BTreeSet<CellId>,
    /// Impacted cells whose re-resolved code changed meaning and must
    /// be re-run by the shell.
    pub cells_to_execute: BTreeSet<CellId>,
    /// Fresh display code per impacted cell.
    pub refreshed: BTreeMap<CellId, String>,
    /// Fresh canonical code per impacted cell.
    pub persistent: BTreeMap<CellId, String>,
    /// The reassignments detected in stage one.
    pub reversions: ReversionMap,
}

pub struct Planner<'a> {
    state: &'a DataflowState,
    refs: &'a mut RefTable,
    ref_links: &'a mut RefLinks,
}

impl<'a> Planner<'a> {
    pub fn new(
        state: &'a DataflowState,
        refs: &'a mut RefTable,
        ref_links: &'a mut RefLinks,
    ) -> Self {
        Planner {
            state,
            refs,
            ref_links,
        }
    }

    pub fn plan(&mut self, request: &PlanRequest<'_>) -> PlanOutcome {
        let reversions = self.detect_reassignments();
        self.refs.merge_history(request.history);
        let impacted = self.impacted_cells(&reversions, request.cell);

        let mut outcome = PlanOutcome {
            reversions,
            ..PlanOutcome::default()
        };
        for cell in &impacted {
            let Some(code) = request.code_dict.get(cell) else {
                // Inconsistent history: under-impacting only leaves a
                // stale display, so skip rather than fail.
                log::debug!("impacted cell {cell} has no stored code; skipping");
                continue;
            };
            let (display, persistent) = match self.resolve_cell(
                *cell,
                code,
                request.input_tags,
                &outcome.reversions,
            ) {
                Ok(pair) => pair,
                Err(err) => {
                    log::debug!("transform fallback for impacted cell {cell}: {err}");
                    (code.clone(), code.clone())
                }
            };
            let class = match request.persisted_code.get(cell) {
                Some(stored) if equiv::code_equivalent(&persistent, stored) => {
                    &mut outcome.cells_to_update
                }
                // First resolution, or a changed target: must re-run.
                _ => &mut outcome.cells_to_execute,
            };
            class.insert(*cell);
            outcome.refreshed.insert(*cell, display);
            outcome.persistent.insert(*cell, persistent);
        }
        if !impacted.is_empty() {
            log::debug!(
                "planned cycle for cell {}: update {:?}, execute {:?}",
                request.cell,
                outcome.cells_to_update,
                outcome.cells_to_execute
            );
        }
        outcome
    }

    /// Stage one: a tag declared by exactly one cell this cycle, while
    /// the tag table knows exactly one owner outside that declaration,
    /// is a reassignment; the sole previous owner is being superseded.
    /// Anything more tangled (several owners in flux at once) is
    /// conservatively ignored and self-corrects on later cycles.
    fn detect_reassignments(&mut self) -> ReversionMap {
        let mut reversions = ReversionMap::new();
        for (tag, declared) in self.ref_links.iter() {
            let mut declared_iter = declared.iter();
            let (Some(&current), None) = (declared_iter.next(), declared_iter.next()) else {
                continue;
            };
            let known = self.state.owners(tag);
            if known.is_empty() {
                continue;
            }
            let mut outside = known.difference(declared);
            let (Some(&previous), None) = (outside.next(), outside.next()) else {
                continue;
            };
            reversions.insert(tag.clone(), Reversion { previous, current });
        }
        for (tag, rev) in &reversions {
            // Project the superseded owner into the snapshot so
            // grounding stays consistent for the rest of this pass; the
            // tag table itself is never written here.
            self.ref_links.add(tag.clone(), rev.previous);
        }
        if !reversions.is_empty() {
            log::warn!("tags exported a second time: {reversions:?}");
        }
        reversions
    }

    /// Stage three: a cell is impacted iff it recorded the superseded
    /// owner for a reassigned tag. The running cell is also impacted
    /// when it references a tag it just re-exported.
    fn impacted_cells(
        &self,
        reversions: &ReversionMap,
        current_cell: CellId,
    ) -> BTreeSet<CellId> {
        let mut impacted = BTreeSet::new();
        for (tag, rev) in reversions {
            for (cell, refs) in self.refs.iter() {
                if refs
                    .get(tag)
                    .is_some_and(|owners| owners.contains(&rev.previous))
                {
                    impacted.insert(*cell);
                }
            }
        }
        if let Some(own_refs) = self.refs.get(current_cell) {
            if reversions.keys().any(|tag| own_refs.contains_key(tag)) {
                impacted.insert(current_cell);
            }
        }
        impacted
    }

    /// Stage four, per cell: run the full pipeline again under the
    /// updated snapshot and reversion map, producing display and
    /// persistent forms.
    fn resolve_cell(
        &self,
        cell: CellId,
        code: &str,
        aliases: &TagAliases,
        reversions: &ReversionMap,
    ) -> Result<(String, String), crate::error::ScanError> {
        let expanded = transform::expand_dollars(code, self.state, cell, aliases)?;
        let grounded = transform::ground_refs(
            &expanded,
            self.state,
            cell,
            aliases,
            self.ref_links,
            reversions,
        )?;
        let display =
            transform::to_dollar(&grounded, self.state, self.ref_links, reversions, true)?;
        let persistent = transform::to_persistent(&grounded)?;
        Ok((display, persistent))
    }
}
