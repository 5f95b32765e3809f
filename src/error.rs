//! Index construction errors.

use core::fmt;

/// Errors that can occur while building an index.
///
/// Query paths are infallible; only construction can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An allocation failed while building the index. Partially built state
    /// is released before this is returned.
    OutOfMemory,

    /// An intra-block count sequence was not non-decreasing or exceeded the
    /// block universe. The build pass produces only valid sequences, so this
    /// indicates a bug rather than bad input.
    InvalidL2Sequence {
        /// Index of the 128-bit record being encoded.
        record: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "allocation failed while building index"),
            Error::InvalidL2Sequence { record } => {
                write!(f, "invalid intra-block count sequence at record {record}")
            }
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::OutOfMemory.to_string(),
            "allocation failed while building index"
        );
        assert_eq!(
            Error::InvalidL2Sequence { record: 7 }.to_string(),
            "invalid intra-block count sequence at record 7"
        );
    }
}
