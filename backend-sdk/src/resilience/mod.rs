//! Resilience patterns for backend calls
//!
//! Retry is the only resilience strategy in the SDK and `RetryPolicy` is the
//! only place it happens. Adapters never loop on their own.

mod retry;

pub use retry::{RetryConfig, RetryPolicy};

use serde::{Deserialize, Serialize};

/// Whether an operation changes backend state
///
/// Mutating operations are attempted exactly once so a lost response can never
/// produce a duplicate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Safe to repeat: read, query
    Read,

    /// Not safe to repeat: create, update, comment, transition, assign
    Mutating,
}

impl OperationClass {
    /// Whether the retry policy may re-attempt this class of operation
    pub fn is_retryable(self) -> bool {
        matches!(self, OperationClass::Read)
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Mutating => write!(f, "mutating"),
        }
    }
}
