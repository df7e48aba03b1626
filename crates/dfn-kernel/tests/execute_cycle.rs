use std::collections::{BTreeMap, BTreeSet, VecDeque};

use dfn_kernel::{CodeSink, ExecuteOutcome, KernelError, Session, Shell};
use dfn_types::{CellId, ExecuteRequest, RefHistory, ReplyStatus, RunError, RunOutcome, TagName};

fn cell(id: u64) -> CellId {
    CellId::new(id)
}

fn tag(name: &str) -> TagName {
    TagName::new(name).unwrap()
}

fn owners(ids: &[u64]) -> BTreeSet<CellId> {
    ids.iter().copied().map(CellId::new).collect()
}

fn exports(entries: &[(&str, &[u64])]) -> BTreeMap<TagName, BTreeSet<CellId>> {
    entries
        .iter()
        .map(|(name, ids)| (tag(name), owners(ids)))
        .collect()
}

struct ScriptedShell {
    outcomes: VecDeque<RunOutcome>,
    calls: Vec<(CellId, String)>,
}

impl ScriptedShell {
    fn new(outcomes: Vec<RunOutcome>) -> Self {
        ScriptedShell {
            outcomes: outcomes.into(),
            calls: Vec::new(),
        }
    }
}

impl Shell for ScriptedShell {
    fn run(&mut self, grounded_code: &str, cell: CellId) -> RunOutcome {
        self.calls.push((cell, grounded_code.to_string()));
        self.outcomes
            .pop_front()
            .unwrap_or_else(|| RunOutcome::ok(BTreeMap::new()))
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Vec<BTreeMap<CellId, String>>,
}

impl CodeSink for RecordingSink {
    fn publish(&mut self, updates: &BTreeMap<CellId, String>) {
        self.batches.push(updates.clone());
    }
}

fn request(code: &str, id: u64, declared: &[(u64, &[&str])]) -> ExecuteRequest {
    let output_tags = declared
        .iter()
        .map(|(cell_id, tags)| {
            (
                cell(*cell_id),
                tags.iter().map(|name| tag(name)).collect::<BTreeSet<_>>(),
            )
        })
        .collect();
    ExecuteRequest {
        code: code.to_string(),
        cell: cell(id),
        input_tags: BTreeMap::new(),
        output_tags,
        code_dict: BTreeMap::new(),
        persisted_code: BTreeMap::new(),
        all_refs: RefHistory::new(),
    }
}

#[test]
fn first_export_runs_as_a_forward_reference() {
    let mut session = Session::new();
    let mut shell = ScriptedShell::new(vec![RunOutcome::ok(exports(&[("x", &[1])]))]);
    let mut sink = RecordingSink::default();

    let outcome = session
        .execute(request("$x = 5", 1, &[(1, &["x"])]), &mut shell, &mut sink)
        .unwrap();

    assert_eq!(shell.calls, vec![(cell(1), "$x = 5".to_string())]);
    assert_eq!(outcome.display_code, "$x = 5");
    assert_eq!(outcome.reply.status, ReplyStatus::Ok);
    assert_eq!(outcome.reply.execution_count, 1);
    assert_eq!(outcome.reply.persistent_code[&cell(1)], "$x = 5");
    assert_eq!(outcome.reply.identifier_refs[&cell(1)], BTreeMap::new());
    assert!(outcome.cells_to_update.is_empty());
    assert!(outcome.cells_to_execute.is_empty());
    assert_eq!(sink.batches.len(), 1);
    assert!(sink.batches[0].is_empty());
    assert_eq!(session.dataflow_state().owners(&tag("x")), owners(&[1]));
}

#[test]
fn dependent_cell_is_grounded_and_echoed_without_ids() {
    let mut session = Session::new();
    let mut shell = ScriptedShell::new(vec![
        RunOutcome::ok(exports(&[("x", &[1])])),
        RunOutcome::ok(exports(&[("y", &[3])])),
    ]);
    let mut sink = RecordingSink::default();

    session
        .execute(request("$x = 5", 1, &[(1, &["x"])]), &mut shell, &mut sink)
        .unwrap();

    let mut second = request("y = $x * 2", 3, &[(3, &["y"])]);
    second.code_dict.insert(cell(1), "$x = 5".to_string());
    let outcome = session.execute(second, &mut shell, &mut sink).unwrap();

    assert_eq!(shell.calls[1], (cell(3), "y = x$1 * 2".to_string()));
    assert_eq!(outcome.display_code, "y = $x * 2");
    assert_eq!(outcome.reply.persistent_code[&cell(3)], "y = $x$1 * 2");
    assert_eq!(
        outcome.reply.identifier_refs[&cell(3)],
        BTreeMap::from([(tag("x"), owners(&[1]))])
    );
}

/// Runs three cycles: x from cell 1, a dependent cell 3, then cell 4
/// re-exports x.
fn run_reexport_chain(
    persisted_for_3: &str,
) -> (Session, ScriptedShell, RecordingSink, ExecuteOutcome) {
    let mut session = Session::new();
    let mut shell = ScriptedShell::new(vec![
        RunOutcome::ok(exports(&[("x", &[1])])),
        RunOutcome::ok(exports(&[("y", &[3])])),
        RunOutcome::ok(exports(&[("x", &[1, 4])])),
    ]);
    let mut sink = RecordingSink::default();

    session
        .execute(request("$x = 5", 1, &[(1, &["x"])]), &mut shell, &mut sink)
        .unwrap();
    let mut second = request("y = $x * 2", 3, &[(3, &["y"])]);
    second.code_dict.insert(cell(1), "$x = 5".to_string());
    session.execute(second, &mut shell, &mut sink).unwrap();

    let mut third = request("$x = $x + 1", 4, &[(4, &["x"])]);
    third.code_dict.insert(cell(1), "$x = 5".to_string());
    third.code_dict.insert(cell(3), "y = $x * 2".to_string());
    third
        .persisted_code
        .insert(cell(3), persisted_for_3.to_string());
    third.all_refs.insert(
        cell(3),
        BTreeMap::from([(tag("x"), owners(&[1]))]),
    );
    let outcome = session.execute(third, &mut shell, &mut sink).unwrap();
    (session, shell, sink, outcome)
}

#[test]
fn reexport_reassigns_and_replans_dependents() {
    let (session, shell, sink, outcome) = run_reexport_chain("y = $x$1 * 2");

    // The submitted cell references the previous exporter of x.
    assert_eq!(shell.calls[2], (cell(4), "x$1 = x$1 + 1".to_string()));
    // Contested tag: the echo keeps explicit owner ids.
    assert_eq!(outcome.display_code, "$x$1 = $x$1 + 1");

    // Cell 3 is rebound to the new exporter and must re-run; cell 4
    // has no persisted form yet, so it must run too.
    assert!(outcome.cells_to_update.is_empty());
    assert_eq!(outcome.cells_to_execute, owners(&[3, 4]));
    assert_eq!(outcome.code_updates[&cell(3)], "y = $x$4 * 2");
    assert_eq!(outcome.code_updates[&cell(4)], "$x$1 = $x$1 + 1");
    assert_eq!(sink.batches[2], outcome.code_updates);
    assert_eq!(outcome.data.code_dict[&cell(3)], "y = $x$4 * 2");
    assert_eq!(outcome.reply.persistent_code[&cell(3)], "y = $x$4 * 2");

    assert_eq!(session.dataflow_state().owners(&tag("x")), owners(&[1, 4]));
}

#[test]
fn unchanged_rebinding_is_update_only() {
    // The client already persisted cell 3 against the new exporter, so
    // the rewrite changes nothing semantically.
    let (_, _, _, outcome) = run_reexport_chain("y = $x$4 * 2");

    assert_eq!(outcome.cells_to_update, owners(&[3]));
    assert_eq!(outcome.cells_to_execute, owners(&[4]));
}

#[test]
fn shell_failure_short_circuits_the_planner() {
    let mut session = Session::new();
    let mut shell = ScriptedShell::new(vec![RunOutcome::ok(exports(&[("x", &[1])]))]);
    let mut sink = RecordingSink::default();
    session
        .execute(request("$x = 5", 1, &[(1, &["x"])]), &mut shell, &mut sink)
        .unwrap();
    let state_before = session.dataflow_state().clone();
    let refs_before = session.identifier_refs().clone();

    let mut shell = ScriptedShell::new(vec![RunOutcome::failed(RunError {
        ename: "ZeroDivisionError".to_string(),
        evalue: "division by zero".to_string(),
        traceback: vec!["...".to_string()],
    })]);
    let outcome = session
        .execute(
            request("z = $x / 0", 3, &[(3, &["z"])]),
            &mut shell,
            &mut sink,
        )
        .unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Error);
    assert_eq!(
        outcome.reply.error.as_ref().map(|e| e.ename.as_str()),
        Some("ZeroDivisionError")
    );
    assert!(outcome.cells_to_update.is_empty());
    assert!(outcome.cells_to_execute.is_empty());
    // No second batch was published.
    assert_eq!(sink.batches.len(), 1);
    // Session tables are exactly as they were before the cycle.
    assert_eq!(session.dataflow_state(), &state_before);
    assert_eq!(session.identifier_refs(), &refs_before);
    assert!(session.is_idle());
}

#[test]
fn unparsable_code_runs_as_written_and_records_nothing() {
    let mut session = Session::new();
    let mut shell = ScriptedShell::new(vec![RunOutcome::ok(BTreeMap::new())]);
    let mut sink = RecordingSink::default();

    let outcome = session
        .execute(request("$x = (", 9, &[(9, &["x"])]), &mut shell, &mut sink)
        .unwrap();

    assert_eq!(shell.calls[0], (cell(9), "$x = (".to_string()));
    assert_eq!(outcome.display_code, "$x = (");
    assert_eq!(outcome.reply.status, ReplyStatus::Ok);
    assert!(!outcome.reply.identifier_refs.contains_key(&cell(9)));
}

#[test]
fn payloads_are_validated_at_the_boundary() {
    let mut session = Session::new();
    let mut shell = ScriptedShell::new(vec![]);
    let mut sink = RecordingSink::default();

    let err = session
        .execute_payload(
            serde_json::json!({"code": "$x"}),
            &mut shell,
            &mut sink,
        )
        .unwrap_err();
    assert!(matches!(err, KernelError::Request(_)), "{err}");
    assert!(shell.calls.is_empty());

    let outcome = session
        .execute_payload(
            serde_json::json!({
                "code": "$x = 5",
                "uuid": "1",
                "output_tags": {"1": ["x"]},
                "code_dict": {},
                "persisted_code": {},
                "all_refs": {},
            }),
            &mut shell,
            &mut sink,
        )
        .unwrap();
    assert_eq!(outcome.reply.status, ReplyStatus::Ok);
}
