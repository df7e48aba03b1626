//! The four composable rewrite passes between user syntax (`$tag`),
//! grounded syntax (`tag$owner`), and the display/persistent dollar
//! forms.
//!
//! Every pass is a pure function over the cell text plus read-only
//! state, is idempotent on its own output, and leaves non-reference
//! text byte-for-byte unchanged. Tokenization failures propagate as
//! `ScanError`; callers fall back to the pre-transform text.

use std::collections::{BTreeMap, BTreeSet};

use dfn_types::{CellId, TagName};

use crate::error::ScanError;
use crate::scan::{self, RefForm, RefToken, Token};
use crate::state::{DataflowState, RefLinks, ReversionMap};

/// Per-cell renaming table supplied by the client: alias -> tag.
pub type TagAliases = BTreeMap<String, TagName>;

fn resolve_alias<'t>(tag: &'t TagName, aliases: &'t TagAliases) -> &'t TagName {
    aliases.get(tag.as_str()).unwrap_or(tag)
}

fn grounded_text(tag: &TagName, owner: CellId) -> String {
    format!("{tag}${owner}")
}

fn dollar_text(tag: &TagName, owner: Option<CellId>) -> String {
    match owner {
        Some(owner) => format!("${tag}${owner}"),
        None => format!("${tag}"),
    }
}

/// Dollar-to-identifier pass: rewrite `$tag` into a grounded reference
/// bound to a specific owner.
///
/// Aliases are resolved before lookup; the transformed cell itself is
/// excluded from candidate owners so a cell referencing a tag it also
/// exports targets the previous exporter. A tag with no owner, or with
/// more than one candidate, is left untouched: forward references may
/// resolve once the exporting cell runs, ambiguous ones are settled by
/// [`ground_refs`].
pub fn expand_dollars(
    code: &str,
    state: &DataflowState,
    cell: CellId,
    aliases: &TagAliases,
) -> Result<String, ScanError> {
    let tokens = scan::scan(code)?;
    let mut out = String::with_capacity(code.len());
    for token in &tokens {
        match token {
            Token::Ref(r) if r.form == RefForm::Dollar => {
                let tag = resolve_alias(&r.tag, aliases);
                match r.owner {
                    Some(owner) => out.push_str(&grounded_text(tag, owner)),
                    None => {
                        let owners = state.owners_excluding(tag, cell);
                        let mut candidates = owners.iter();
                        match (candidates.next(), candidates.next()) {
                            (Some(&owner), None) => out.push_str(&grounded_text(tag, owner)),
                            _ => out.push_str(r.text),
                        }
                    }
                }
            }
            other => out.push_str(other.text()),
        }
    }
    Ok(out)
}

/// Grounding pass: settle the references [`expand_dollars`] left open
/// and rebind references caught by a reassignment.
///
/// For a tag with several candidate owners the owner *not* declared in
/// the `ref_links` snapshot is preferred, so a tag being re-exported by
/// the running cell does not retroactively rebind settled references
/// until the planner decides to. When the planner has recorded a
/// reversion for a tag, references bound to the superseded owner move
/// to the new one, except inside the new exporter itself.
pub fn ground_refs(
    code: &str,
    state: &DataflowState,
    cell: CellId,
    aliases: &TagAliases,
    ref_links: &RefLinks,
    reversions: &ReversionMap,
) -> Result<String, ScanError> {
    let tokens = scan::scan(code)?;
    let mut out = String::with_capacity(code.len());
    for token in &tokens {
        match token {
            Token::Ref(r) => {
                out.push_str(&ground_one(r, state, cell, aliases, ref_links, reversions))
            }
            other => out.push_str(other.text()),
        }
    }
    Ok(out)
}

fn ground_one(
    r: &RefToken<'_>,
    state: &DataflowState,
    cell: CellId,
    aliases: &TagAliases,
    ref_links: &RefLinks,
    reversions: &ReversionMap,
) -> String {
    let tag = resolve_alias(&r.tag, aliases);
    if let Some(owner) = r.owner {
        return grounded_text(tag, rebind(tag, owner, cell, reversions));
    }
    let owners = state.owners_excluding(tag, cell);
    let chosen = {
        let mut candidates = owners.iter();
        match (candidates.next(), candidates.next()) {
            (None, _) => None,
            (Some(&only), None) => Some(only),
            _ => pick_owner(tag, &owners, cell, ref_links, reversions),
        }
    };
    match chosen {
        Some(owner) => grounded_text(tag, rebind(tag, owner, cell, reversions)),
        None => r.text.to_string(),
    }
}

fn pick_owner(
    tag: &TagName,
    owners: &BTreeSet<CellId>,
    cell: CellId,
    ref_links: &RefLinks,
    reversions: &ReversionMap,
) -> Option<CellId> {
    if let Some(rev) = reversions.get(tag) {
        let target = if rev.current == cell {
            rev.previous
        } else {
            rev.current
        };
        if owners.contains(&target) {
            return Some(target);
        }
    }
    let outside: Vec<CellId> = owners
        .iter()
        .copied()
        .filter(|owner| {
            !ref_links
                .declared(tag)
                .is_some_and(|declared| declared.contains(owner))
        })
        .collect();
    if let [only] = outside.as_slice() {
        return Some(*only);
    }
    // Still contested: bind the newest exporter, deterministically.
    log::debug!("tag '{tag}' contested by {owners:?}; binding newest");
    owners.iter().next_back().copied()
}

fn rebind(tag: &TagName, owner: CellId, cell: CellId, reversions: &ReversionMap) -> CellId {
    match reversions.get(tag) {
        Some(rev) if rev.previous == owner && rev.current != cell => rev.current,
        _ => owner,
    }
}

/// Identifier-to-dollar pass, display flavor.
///
/// Owner suffixes are suppressed when `retain_ids` is false and the
/// binding is unambiguous; a tag under reversion or contested in the
/// snapshot always keeps its explicit owner.
pub fn to_dollar(
    code: &str,
    state: &DataflowState,
    ref_links: &RefLinks,
    reversions: &ReversionMap,
    retain_ids: bool,
) -> Result<String, ScanError> {
    let tokens = scan::scan(code)?;
    let mut out = String::with_capacity(code.len());
    for token in &tokens {
        match token {
            Token::Ref(r) => match r.owner {
                Some(owner) => {
                    let sole_owner = state.owners(&r.tag) == BTreeSet::from([owner]);
                    let show = retain_ids
                        || reversions.contains_key(&r.tag)
                        || ref_links.conflicts(&r.tag, owner)
                        || !sole_owner;
                    out.push_str(&dollar_text(&r.tag, show.then_some(owner)));
                }
                None => out.push_str(r.text),
            },
            other => out.push_str(other.text()),
        }
    }
    Ok(out)
}

/// Identifier-to-dollar pass, persistent flavor: every bound reference
/// keeps its owner, nothing is suppressed or rebound. Stable across
/// sessions and safe to re-parse.
pub fn to_persistent(code: &str) -> Result<String, ScanError> {
    let tokens = scan::scan(code)?;
    let mut out = String::with_capacity(code.len());
    for token in &tokens {
        match token {
            Token::Ref(r) => match r.owner {
                Some(owner) => out.push_str(&dollar_text(&r.tag, Some(owner))),
                None => out.push_str(r.text),
            },
            other => out.push_str(other.text()),
        }
    }
    Ok(out)
}
