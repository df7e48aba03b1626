//! Structural comparison of two persistent-form code strings.

use dfn_types::{CellId, TagName};

use crate::error::ScanError;
use crate::scan::{self, Token};

#[derive(Debug, PartialEq, Eq)]
enum Canon {
    Text(String),
    Ref(TagName, Option<CellId>),
}

fn canonical(code: &str) -> Result<Vec<Canon>, ScanError> {
    let tokens = scan::scan(code)?;
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Trivia(_) => {}
            Token::Text(t) => out.push(Canon::Text(t.to_string())),
            Token::Ref(r) => out.push(Canon::Ref(r.tag, r.owner)),
        }
    }
    Ok(out)
}

/// True iff the two strings compute the same thing under the
/// transformer's canonicalization: whitespace, comments, and the
/// written shape of a reference are immaterial, the targeted exporter
/// is not. Unscannable inputs degrade to exact string comparison.
pub fn code_equivalent(a: &str, b: &str) -> bool {
    match (canonical(a), canonical(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a == b,
    }
}
