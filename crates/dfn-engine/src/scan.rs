//! Tokenizer for cell source text.
//!
//! The engine treats cell bodies as opaque code with two reserved
//! reference shapes embedded in them: dollar refs (`$tag`,
//! `$tag$owner`) and grounded refs (`tag$owner`). Everything else is
//! carried through byte-for-byte, including string literals and
//! comments, which are deliberately opaque to the rewrite passes.

use dfn_types::{CellId, TagName};
use logos::Logos;

use crate::error::ScanError;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[regex(r"[ \t\r\n]+")]
    Whitespace,
    #[regex(r"#[^\n]*")]
    Comment,
    #[regex("\"([^\"\\\\\n]|\\\\.)*\"")]
    #[regex("'([^'\\\\\n]|\\\\.)*'")]
    Str,
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*(\$[0-9a-fA-F]+)?")]
    DollarRef,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*\$[0-9a-fA-F]+")]
    GroundedRef,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[0-9][0-9A-Za-z_.]*")]
    Number,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[regex("[^ \t\r\nA-Za-z0-9_$'\"#()\\[\\]{}]+")]
    Punct,
}

/// Textual shape a reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefForm {
    /// `$tag` or `$tag$owner`.
    Dollar,
    /// `tag$owner`, the executable form.
    Grounded,
}

/// One tag reference found in a cell body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefToken<'a> {
    pub text: &'a str,
    pub tag: TagName,
    pub owner: Option<CellId>,
    pub form: RefForm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Whitespace or a comment; ignored by equivalence comparison.
    Trivia(&'a str),
    /// Any non-reference code text, preserved verbatim.
    Text(&'a str),
    Ref(RefToken<'a>),
}

impl<'a> Token<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Token::Trivia(t) | Token::Text(t) => t,
            Token::Ref(r) => r.text,
        }
    }
}

/// Tokenize a cell body, checking delimiter balance along the way.
pub fn scan(code: &str) -> Result<Vec<Token<'_>>, ScanError> {
    let mut tokens = Vec::new();
    let mut open: Vec<(u8, usize)> = Vec::new();
    for (result, span) in RawToken::lexer(code).spanned() {
        let slice = &code[span.clone()];
        let raw = match result {
            Ok(raw) => raw,
            Err(()) => return Err(classify_error(slice, span.start)),
        };
        match raw {
            RawToken::Whitespace | RawToken::Comment => tokens.push(Token::Trivia(slice)),
            RawToken::DollarRef => tokens.push(parse_dollar(slice, span.start)?),
            RawToken::GroundedRef => tokens.push(parse_grounded(slice, span.start)?),
            RawToken::LParen => {
                open.push((b')', span.start));
                tokens.push(Token::Text(slice));
            }
            RawToken::LBracket => {
                open.push((b']', span.start));
                tokens.push(Token::Text(slice));
            }
            RawToken::LBrace => {
                open.push((b'}', span.start));
                tokens.push(Token::Text(slice));
            }
            RawToken::RParen | RawToken::RBracket | RawToken::RBrace => {
                let close = slice.as_bytes()[0];
                match open.pop() {
                    Some((expected, _)) if expected == close => {}
                    _ => return Err(ScanError::UnbalancedDelimiter(span.start)),
                }
                tokens.push(Token::Text(slice));
            }
            RawToken::Str | RawToken::Ident | RawToken::Number | RawToken::Punct => {
                tokens.push(Token::Text(slice));
            }
        }
    }
    if let Some((_, at)) = open.pop() {
        return Err(ScanError::UnbalancedDelimiter(at));
    }
    Ok(tokens)
}

fn classify_error(slice: &str, at: usize) -> ScanError {
    match slice.as_bytes().first() {
        Some(b'"') | Some(b'\'') => ScanError::UnterminatedString(at),
        Some(b'$') => ScanError::StrayDollar(at),
        _ => ScanError::Unrecognized(at),
    }
}

fn parse_dollar(slice: &str, at: usize) -> Result<Token<'_>, ScanError> {
    let body = &slice[1..];
    let (tag, owner) = match body.split_once('$') {
        Some((tag, owner_hex)) => (tag, Some(parse_owner(owner_hex, at)?)),
        None => (body, None),
    };
    Ok(Token::Ref(RefToken {
        text: slice,
        tag: TagName::new(tag).map_err(|_| ScanError::Unrecognized(at))?,
        owner,
        form: RefForm::Dollar,
    }))
}

fn parse_grounded(slice: &str, at: usize) -> Result<Token<'_>, ScanError> {
    let (tag, owner_hex) = slice
        .split_once('$')
        .ok_or(ScanError::Unrecognized(at))?;
    Ok(Token::Ref(RefToken {
        text: slice,
        tag: TagName::new(tag).map_err(|_| ScanError::Unrecognized(at))?,
        owner: Some(parse_owner(owner_hex, at)?),
        form: RefForm::Grounded,
    }))
}

fn parse_owner(hex: &str, at: usize) -> Result<CellId, ScanError> {
    CellId::from_hex(hex).map_err(|_| ScanError::InvalidOwner(at))
}
