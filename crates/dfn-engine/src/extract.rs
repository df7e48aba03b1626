//! Derives the tag -> owners map a cell's grounded code actually
//! references.

use dfn_types::RefMap;

use crate::scan::{self, Token};

/// Total over arbitrary input: code that fails to scan, or scans with
/// no bound references, yields an empty map.
pub fn references(grounded_code: &str) -> RefMap {
    let mut refs = RefMap::new();
    let Ok(tokens) = scan::scan(grounded_code) else {
        return refs;
    };
    for token in tokens {
        if let Token::Ref(r) = token {
            if let Some(owner) = r.owner {
                refs.entry(r.tag).or_default().insert(owner);
            }
        }
    }
    refs
}
