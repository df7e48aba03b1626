//! Session-wide dataflow bookkeeping.
//!
//! Three tables, with access scoped per component: the tag table
//! (`DataflowState`) and identifier reference table (`RefTable`) live
//! for the kernel session; the `RefLinks` snapshot is per-cycle scratch
//! built from the client's declared exports. The transformer and
//! extractor only read these; the planner writes the reference table
//! and the snapshot, never the tag table.

use std::collections::{BTreeMap, BTreeSet};

use dfn_types::{CellId, RefHistory, RefMap, TagName};

/// Tag table: who currently exports each tag.
///
/// Mutated only by applying the shell's post-run export report; every
/// present tag has a non-empty owner set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataflowState {
    links: BTreeMap<TagName, BTreeSet<CellId>>,
}

impl DataflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current owner set for a tag; empty if unknown.
    pub fn owners(&self, tag: &TagName) -> BTreeSet<CellId> {
        self.links.get(tag).cloned().unwrap_or_default()
    }

    /// Owner set with one cell excluded; a cell referencing a tag it
    /// also exports targets the previous exporter, not itself.
    pub fn owners_excluding(&self, tag: &TagName, cell: CellId) -> BTreeSet<CellId> {
        let mut owners = self.owners(tag);
        owners.remove(&cell);
        owners
    }

    pub fn contains(&self, tag: &TagName) -> bool {
        self.links.contains_key(tag)
    }

    /// Apply the shell's authoritative per-tag owner report. Each
    /// reported tag is replaced wholesale; an empty owner set retires
    /// the tag, preserving the non-empty invariant.
    pub fn apply_exports(&mut self, report: &BTreeMap<TagName, BTreeSet<CellId>>) {
        for (tag, owners) in report {
            if owners.is_empty() {
                self.links.remove(tag);
            } else {
                self.links.insert(tag.clone(), owners.clone());
            }
        }
    }

    pub fn links(&self) -> &BTreeMap<TagName, BTreeSet<CellId>> {
        &self.links
    }
}

/// Identifier reference table: per cell, the owners its grounded code
/// referenced the last time that cell was grounded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefTable {
    entries: RefHistory,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a cell's recorded references wholesale.
    pub fn record(&mut self, cell: CellId, refs: RefMap) {
        self.entries.insert(cell, refs);
    }

    /// Merge externally persisted history, never overwriting an entry
    /// already present (the in-memory copy is always at least as new).
    pub fn merge_history(&mut self, history: &RefHistory) {
        for (cell, refs) in history {
            self.entries
                .entry(*cell)
                .or_insert_with(|| refs.clone());
        }
    }

    pub fn get(&self, cell: CellId) -> Option<&RefMap> {
        self.entries.get(&cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellId, &RefMap)> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> RefHistory {
        self.entries.clone()
    }
}

/// Per-cycle snapshot of client-declared exports: tag -> declaring
/// cells, inverted from the request's `output_tags`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefLinks {
    by_tag: BTreeMap<TagName, BTreeSet<CellId>>,
}

impl RefLinks {
    pub fn from_output_tags(output_tags: &BTreeMap<CellId, BTreeSet<TagName>>) -> Self {
        let mut by_tag: BTreeMap<TagName, BTreeSet<CellId>> = BTreeMap::new();
        for (cell, tags) in output_tags {
            for tag in tags {
                by_tag.entry(tag.clone()).or_default().insert(*cell);
            }
        }
        RefLinks { by_tag }
    }

    pub fn declared(&self, tag: &TagName) -> Option<&BTreeSet<CellId>> {
        self.by_tag.get(tag)
    }

    /// True when the snapshot declares the tag for some cell other
    /// than `owner`, i.e. the binding is contested this cycle.
    pub fn conflicts(&self, tag: &TagName, owner: CellId) -> bool {
        self.by_tag
            .get(tag)
            .is_some_and(|cells| cells.iter().any(|c| *c != owner))
    }

    /// Planner-side projection of a corrected ownership delta; the tag
    /// table itself is never touched.
    pub fn add(&mut self, tag: TagName, owner: CellId) {
        self.by_tag.entry(tag).or_default().insert(owner);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagName, &BTreeSet<CellId>)> {
        self.by_tag.iter()
    }
}

/// One detected reassignment: `previous` was the sole exporter of a
/// tag now declared by `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reversion {
    pub previous: CellId,
    pub current: CellId,
}

/// Reversion map built in the planner's conflict-detection stage.
pub type ReversionMap = BTreeMap<TagName, Reversion>;

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> TagName {
        TagName::new(name).unwrap()
    }

    fn cells(ids: &[u64]) -> BTreeSet<CellId> {
        ids.iter().copied().map(CellId::new).collect()
    }

    #[test]
    fn apply_exports_replaces_wholesale_and_retires_empty() {
        let mut state = DataflowState::new();
        state.apply_exports(&BTreeMap::from([(tag("x"), cells(&[1]))]));
        assert_eq!(state.owners(&tag("x")), cells(&[1]));

        state.apply_exports(&BTreeMap::from([(tag("x"), cells(&[1, 2]))]));
        assert_eq!(state.owners(&tag("x")), cells(&[1, 2]));

        state.apply_exports(&BTreeMap::from([(tag("x"), BTreeSet::new())]));
        assert!(!state.contains(&tag("x")));
        assert!(state.owners(&tag("x")).is_empty());
    }

    #[test]
    fn owners_excluding_drops_the_asking_cell() {
        let mut state = DataflowState::new();
        state.apply_exports(&BTreeMap::from([(tag("x"), cells(&[1, 2]))]));
        assert_eq!(state.owners_excluding(&tag("x"), CellId::new(2)), cells(&[1]));
    }

    #[test]
    fn merge_history_is_monotone() {
        let mut table = RefTable::new();
        let fresh: RefMap = BTreeMap::from([(tag("x"), cells(&[2]))]);
        table.record(CellId::new(3), fresh.clone());

        let stale: RefMap = BTreeMap::from([(tag("x"), cells(&[1]))]);
        let history: RefHistory = BTreeMap::from([
            (CellId::new(3), stale),
            (CellId::new(4), BTreeMap::from([(tag("y"), cells(&[3]))])),
        ]);
        table.merge_history(&history);

        assert_eq!(table.get(CellId::new(3)), Some(&fresh));
        assert!(table.get(CellId::new(4)).is_some());
    }

    #[test]
    fn ref_links_invert_declared_outputs() {
        let output_tags = BTreeMap::from([
            (CellId::new(2), BTreeSet::from([tag("x"), tag("y")])),
            (CellId::new(5), BTreeSet::from([tag("x")])),
        ]);
        let links = RefLinks::from_output_tags(&output_tags);
        assert_eq!(links.declared(&tag("x")), Some(&cells(&[2, 5])));
        assert!(links.conflicts(&tag("y"), CellId::new(1)));
        assert!(!links.conflicts(&tag("y"), CellId::new(2)));
        assert!(!links.conflicts(&tag("z"), CellId::new(1)));
    }
}
