//! # Offline Error Types

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised inside the offline audio core.
///
/// Public library operations translate these into outcome values and
/// events; the interceptor returns them to whoever issued the request.
#[derive(Error, Debug)]
pub enum OfflineError {
    // ========================================================================
    // Network
    // ========================================================================
    /// Transport-level failure: DNS, connect, reset.
    #[error("Network request failed: {0}")]
    Network(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Download cancelled")]
    Cancelled,

    // ========================================================================
    // Storage
    // ========================================================================
    /// Cache store could not be opened, read or written.
    #[error("Cache storage error: {0}")]
    Cache(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Library index could not be written to the settings store.
    #[error("Failed to persist offline library: {0}")]
    Persistence(String),

    #[error("Offline library index is unreadable: {0}")]
    CorruptIndex(String),

    // ========================================================================
    // Input / lifecycle
    // ========================================================================
    #[error("Track {0} has no download URL")]
    MissingDownloadUrl(String),

    #[error("Interceptor cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

impl OfflineError {
    /// Failures caused by the network rather than local storage.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            OfflineError::Network(_) | OfflineError::HttpStatus { .. } | OfflineError::Timeout(_)
        )
    }

    /// Whether trying the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_network_error() || matches!(self, OfflineError::Cancelled)
    }
}

impl From<BridgeError> for OfflineError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Network(msg) => OfflineError::Network(msg),
            BridgeError::QuotaExceeded(msg) => OfflineError::QuotaExceeded(msg),
            other => OfflineError::Cache(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OfflineError>;
