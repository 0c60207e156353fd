//! Error taxonomy shared by the transport, cache, signing and fetch-chain layers.
//!
//! None of these errors are meant to reach the end user: fetch strategies turn
//! them into a failed attempt, the cache turns them into a miss, and the
//! signature engine turns them into an unsigned query.

use thiserror::Error;

/// Everything that can go wrong while retrieving upstream data.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Upstream answered, but not in the shape we expected.
    #[error("unexpected upstream format: {0}")]
    UpstreamFormat(String),

    /// A cache entry could not be decoded.
    #[error("corrupt cache entry: {0}")]
    CacheCorruption(String),

    /// Signing key material could not be obtained.
    #[error("signing key acquisition failed: {0}")]
    AcquisitionFailure(String),
}

impl FetchError {
    /// Shorthand for [`FetchError::UpstreamFormat`].
    pub fn format(msg: impl Into<String>) -> Self {
        FetchError::UpstreamFormat(msg.into())
    }

    /// True for errors raised below the application protocol (network, status, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Status { .. })
    }
}
