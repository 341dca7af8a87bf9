//! Core error type shared by the store, bus and driver layers.

/// Hub-level error type.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("storage error: {0}")]
    Storage(String),
    /// Backend unreachable after the retry budget; callers should retry later.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Parent is missing or terminal, so it cannot accept new children.
    #[error("invalid parent: {0}")]
    InvalidParent(String),
    /// State change not present in the node transition graph.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// Query limit above the hard cap.
    #[error("query too large: {0}")]
    TooLarge(String),
}
