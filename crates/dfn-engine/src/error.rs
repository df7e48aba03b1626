use thiserror::Error;

/// Tokenization failure inside a transform pass.
///
/// Never surfaced to the client: every caller falls back to the
/// pre-transform text and lets the shell's own error reporting take
/// over at execution time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    #[error("unterminated string literal at byte {0}")]
    UnterminatedString(usize),
    #[error("stray '$' at byte {0}")]
    StrayDollar(usize),
    #[error("unbalanced delimiter at byte {0}")]
    UnbalancedDelimiter(usize),
    #[error("invalid owner id in reference at byte {0}")]
    InvalidOwner(usize),
    #[error("unrecognized token at byte {0}")]
    Unrecognized(usize),
}
