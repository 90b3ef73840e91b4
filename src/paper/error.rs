use std::fmt;

/// Errors raised while decoding a command stream.
///
/// Offsets are byte positions in the stream where the problem was detected.
/// None of them are fatal for the stream as a whole: the decoder drops the
/// offending instruction and resumes at the scanner position.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The stream ended in the middle of an operand.
    UnexpectedEnd { offset: usize },
    /// A number operand contained something other than `-`, digits or `.`.
    InvalidNumber { offset: usize, found: char },
    /// A string length prefix was negative or fractional.
    InvalidLength { offset: usize, value: f64 },
    /// A color literal was not six hex digits.
    InvalidColor { offset: usize },
}

impl DecodeError {
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnexpectedEnd { offset }
            | DecodeError::InvalidNumber { offset, .. }
            | DecodeError::InvalidLength { offset, .. }
            | DecodeError::InvalidColor { offset } => *offset,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEnd { offset } => {
                write!(f, "unexpected end of command stream at {offset}")
            }
            DecodeError::InvalidNumber { offset, found } => {
                write!(f, "invalid character {found:?} in number at {offset}")
            }
            DecodeError::InvalidLength { offset, value } => {
                write!(f, "invalid string length {value} at {offset}")
            }
            DecodeError::InvalidColor { offset } => write!(f, "invalid color literal at {offset}"),
        }
    }
}

impl std::error::Error for DecodeError {}
