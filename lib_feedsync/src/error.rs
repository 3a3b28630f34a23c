//! # Error Kinds
//!
//! Every failure path leaves the content store in a previously valid state, so
//! none of these errors is fatal. They differ in how a caller recovers:
//!
//! - `FetchError`: keep showing the previous items, offer a retry.
//! - `MutationError::Failed`: the optimistic patch was rolled back; the error is
//!   scoped to the toggled target and may be retried.
//! - `MutationError::Unauthenticated`: not retried; prompt the member to sign in.

use thiserror::Error;

use crate::model::Category;

/// Failure reported by a backend read, write or push channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never produced a response (connect, TLS, timeout, retries exhausted).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status.
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected rows.
    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    /// The backend refused a write (constraint or access policy).
    #[error("Backend rejected the write: {0}")]
    Rejected(String),

    /// The push channel could not be opened or was closed underneath us.
    #[error("Push channel error: {0}")]
    Channel(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// A fetch cycle failed. The store kept its previous items.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to fetch {category} feed: {source}")]
pub struct FetchError {
    pub category: Category,
    #[source]
    pub source: BackendError,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// What a mutation targets: one item, or every item of one creator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    Like { item_id: String },
    Follow { creator_name: String },
}

impl std::fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationTarget::Like { item_id } => write!(f, "like on item '{}'", item_id),
            MutationTarget::Follow { creator_name } => write!(f, "follow of creator '{}'", creator_name),
        }
    }
}

/// A like/follow toggle did not stick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// No viewer is signed in. Nothing was applied.
    #[error("Sign in to change engagement state")]
    Unauthenticated,

    /// The target is not part of the current item collection. Nothing was applied.
    #[error("Unknown mutation target: {0}")]
    UnknownTarget(MutationTarget),

    /// The durable write failed and the optimistic patch was rolled back.
    #[error("Failed to persist {target}: {source}")]
    Failed {
        target: MutationTarget,
        #[source]
        source: BackendError,
    },
}

impl MutationError {
    /// Whether retrying the same toggle can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutationError::Failed { .. })
    }

    /// Whether the caller should route the member to a sign-in flow.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, MutationError::Unauthenticated)
    }
}

/// Configuration could not be turned into usable settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_write_failures_are_retryable_mutations() {
        let failed = MutationError::Failed {
            target: MutationTarget::Like { item_id: "a".into() },
            source: BackendError::Network("reset".into()),
        };
        assert!(failed.is_retryable());
        assert!(!MutationError::Unauthenticated.is_retryable());
        assert!(MutationError::Unauthenticated.requires_sign_in());
    }

    #[test]
    fn fetch_error_names_category() {
        let err = FetchError {
            category: Category::Listen,
            source: BackendError::Status { status: 503, body: "busy".into() },
        };
        assert_eq!(err.to_string(), "Failed to fetch listen feed: Backend returned status 503: busy");
        assert!(err.is_retryable());
    }
}
