//! Test error types.

use std::fmt;
use std::time::Duration;

/// Errors reported by the test helpers.
#[derive(Debug)]
pub enum TestError {
    /// The owner thread panicked
    OwnerPanicked(String),
    /// A condition did not become true in time
    Timeout(Duration),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnerPanicked(msg) => write!(f, "Owner thread panicked: {msg}"),
            Self::Timeout(after) => write!(f, "Timed out after {after:?}"),
        }
    }
}

impl std::error::Error for TestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TestError::OwnerPanicked("boom".to_string());
        assert_eq!(err.to_string(), "Owner thread panicked: boom");

        let err = TestError::Timeout(Duration::from_millis(20));
        assert_eq!(err.to_string(), "Timed out after 20ms");
    }
}
