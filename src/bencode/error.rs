use thiserror::Error;

/// Errors produced while decoding bencode.
#[derive(Debug, Error)]
pub enum BencodeError {
    /// Input ended before a complete value was parsed.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Integer is malformed: empty, leading zeros, `-0`, or overflow.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Byte-string length prefix is not a valid number.
    #[error("invalid string length")]
    InvalidStringLength,

    /// A byte that cannot start a value (or a non-string dict key).
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),

    /// Extra bytes remain after the value.
    #[error("trailing data after value")]
    TrailingData,

    /// Recursion limit exceeded.
    #[error("nesting too deep")]
    NestingTooDeep,
}
