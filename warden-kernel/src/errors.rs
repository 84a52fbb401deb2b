use crate::store::StoreError;

/// Failures of a single site operation.
///
/// `MalformedSnapshot` is fatal to the call and leaves every record untouched.
/// `ModuleNotFound` is recovered by the reconciler and only surfaces as a
/// warning. Store failures are passed through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("Module not found: {0}")]
    ModuleNotFound(String),
    #[error("Site not found: {0}")]
    SiteNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while pushing a refresh request to a remote site.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

pub type Result<T, E = WardenError> = std::result::Result<T, E>;
