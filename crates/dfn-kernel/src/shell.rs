use dfn_types::{CellId, RunOutcome};

/// The external interactive shell that actually executes a cell.
///
/// The orchestrator's single suspension point: it calls `run` once per
/// cycle for the submitted cell and touches no session state until the
/// outcome comes back. The reported export map is authoritative for
/// tag ownership after the run.
pub trait Shell {
    fn run(&mut self, grounded_code: &str, cell: CellId) -> RunOutcome;
}
