//! Unified error type for feed and state operations.
//!
//! Domain/load failures travel on a message's Error axis and stay recoverable:
//! a new refresh token retries them. Cancellation is a distinct non-error
//! outcome — it is never placed on the Error axis and is filtered out of
//! error reporting paths.

use serde::{Deserialize, Serialize};

/// Unified error type for all Rill operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FeedError {
    /// A producer-supplied load function failed.
    #[error("Load failed: {message}")]
    Load {
        /// Error message describing the load failure
        message: String,
    },

    /// The operation was cancelled through its cancellation token.
    ///
    /// Not a failure: callers treat this as a separate outcome and must not
    /// report it through error surfaces.
    #[error("Cancelled")]
    Cancelled,

    /// Internal plumbing error. Fatal to the subscription that hit it,
    /// never to the producer.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl FeedError {
    /// Create a load error.
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this value represents cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
