use std::collections::{BTreeMap, BTreeSet};

use dfn_engine::{
    DataflowState, PlanOutcome, PlanRequest, Planner, RefLinks, RefTable, ReversionMap, extract,
    transform,
};
use dfn_types::{CellId, ExecuteReply, ExecuteRequest, RefMap, ReplyStatus, RunOutcome};

use crate::comm::CodeSink;
use crate::error::KernelError;
use crate::shell::Shell;

/// Everything a cycle hands back to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub reply: ExecuteReply,
    pub cells_to_update: BTreeSet<CellId>,
    pub cells_to_execute: BTreeSet<CellId>,
    /// The batched refreshed-code payload, as handed to the sink.
    pub code_updates: BTreeMap<CellId, String>,
    /// Display form of the submitted cell, echoed to the client.
    pub display_code: String,
    /// The request's session-state bundle, updated in place.
    pub data: ExecuteRequest,
}

/// Single-process session state for one kernel.
///
/// Owns the tag table and the identifier reference table for the
/// kernel's lifetime. Exactly one execute cycle runs at a time; the
/// guard is enforced explicitly in case the transport delivers
/// requests concurrently.
#[derive(Debug, Default)]
pub struct Session {
    state: DataflowState,
    refs: RefTable,
    /// Snapshot retained from the last successful cycle, superseded at
    /// the start of the next one.
    ref_links: RefLinks,
    in_flight: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataflow_state(&self) -> &DataflowState {
        &self.state
    }

    pub fn identifier_refs(&self) -> &RefTable {
        &self.refs
    }

    pub fn ref_links(&self) -> &RefLinks {
        &self.ref_links
    }

    pub fn is_idle(&self) -> bool {
        !self.in_flight
    }

    /// Parse a raw JSON payload and run it as an execute cycle.
    pub fn execute_payload<S: Shell, C: CodeSink>(
        &mut self,
        payload: serde_json::Value,
        shell: &mut S,
        sink: &mut C,
    ) -> Result<ExecuteOutcome, KernelError> {
        let request = ExecuteRequest::from_value(payload)?;
        self.execute(request, shell, sink)
    }

    /// Run one execute cycle for a validated request.
    ///
    /// Execution failure is not an error at this level: the shell's
    /// report is propagated unchanged on the reply and the planner is
    /// skipped, leaving both session tables exactly as they were.
    pub fn execute<S: Shell, C: CodeSink>(
        &mut self,
        request: ExecuteRequest,
        shell: &mut S,
        sink: &mut C,
    ) -> Result<ExecuteOutcome, KernelError> {
        if self.in_flight {
            return Err(KernelError::CycleInFlight);
        }
        self.in_flight = true;
        let outcome = self.run_cycle(request, shell, sink);
        self.in_flight = false;
        Ok(outcome)
    }

    fn run_cycle<S: Shell, C: CodeSink>(
        &mut self,
        mut request: ExecuteRequest,
        shell: &mut S,
        sink: &mut C,
    ) -> ExecuteOutcome {
        let cell = request.cell;
        let mut ref_links = RefLinks::from_output_tags(&request.output_tags);
        let no_reversions = ReversionMap::new();

        let transformed = transform::expand_dollars(
            &request.code,
            &self.state,
            cell,
            &request.input_tags,
        )
        .and_then(|code| {
            transform::ground_refs(
                &code,
                &self.state,
                cell,
                &request.input_tags,
                &ref_links,
                &no_reversions,
            )
        });
        // A cell that fails to tokenize runs as written; the shell's
        // own error reporting takes over, and no references are
        // recorded for it.
        let (grounded, scratch_refs): (String, Option<RefMap>) = match transformed {
            Ok(grounded) => {
                let refs = extract::references(&grounded);
                (grounded, Some(refs))
            }
            Err(err) => {
                log::debug!("transform fallback for cell {cell}: {err}");
                (request.code.clone(), None)
            }
        };
        let display = transform::to_dollar(&grounded, &self.state, &ref_links, &no_reversions, false)
            .unwrap_or_else(|_| grounded.clone());
        let persistent = transform::to_persistent(&grounded).unwrap_or_else(|_| grounded.clone());
        request.code_dict.insert(cell, display.clone());

        let run = shell.run(&grounded, cell);
        if !run.success {
            // Per-cycle scratch is discarded; tables stay untouched.
            return failed_outcome(run, cell, display, request);
        }

        self.state.apply_exports(&run.exported);
        if let Some(refs) = scratch_refs {
            self.refs.record(cell, refs);
        }

        let plan = Planner::new(&self.state, &mut self.refs, &mut ref_links).plan(&PlanRequest {
            cell,
            input_tags: &request.input_tags,
            history: &request.all_refs,
            code_dict: &request.code_dict,
            persisted_code: &request.persisted_code,
        });
        let code_updates = self.apply_plan(&plan, &mut request);
        sink.publish(&code_updates);
        self.ref_links = ref_links;

        let mut persistent_code = BTreeMap::from([(cell, persistent)]);
        persistent_code.extend(
            plan.persistent
                .iter()
                .map(|(id, code)| (*id, code.clone())),
        );
        let reply = ExecuteReply {
            status: ReplyStatus::Ok,
            execution_count: cell.as_u64(),
            identifier_refs: self.refs.snapshot(),
            persistent_code,
            deleted_cells: run.deleted_cells,
            error: None,
        };
        ExecuteOutcome {
            reply,
            cells_to_update: plan.cells_to_update,
            cells_to_execute: plan.cells_to_execute,
            code_updates,
            display_code: display,
            data: request,
        }
    }

    /// Fold the planner's refreshed code into the session bundle and
    /// build the batched payload for the sink.
    fn apply_plan(
        &self,
        plan: &PlanOutcome,
        request: &mut ExecuteRequest,
    ) -> BTreeMap<CellId, String> {
        for (id, code) in &plan.refreshed {
            request.code_dict.insert(*id, code.clone());
        }
        let mut updates = BTreeMap::new();
        for id in plan.cells_to_update.iter().chain(&plan.cells_to_execute) {
            if let Some(code) = request.code_dict.get(id) {
                updates.insert(*id, code.clone());
            }
        }
        updates
    }
}

fn failed_outcome(
    run: RunOutcome,
    cell: CellId,
    display: String,
    request: ExecuteRequest,
) -> ExecuteOutcome {
    ExecuteOutcome {
        reply: ExecuteReply {
            status: ReplyStatus::Error,
            execution_count: cell.as_u64(),
            identifier_refs: BTreeMap::new(),
            persistent_code: BTreeMap::new(),
            deleted_cells: run.deleted_cells,
            error: run.error,
        },
        cells_to_update: BTreeSet::new(),
        cells_to_execute: BTreeSet::new(),
        code_updates: BTreeMap::new(),
        display_code: display,
        data: request,
    }
}
