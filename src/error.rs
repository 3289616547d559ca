use std::sync::Arc;
use thiserror::Error;

/// A boxed error as returned by inner request listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminates a proxied request/response cycle.
///
/// The error is `Clone` because the same outcome may be handed to more than one
/// completion path, so the payloads are kept behind `Arc`.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The inner request listener returned an error. The original error is kept as-is
    /// and can be recovered with `downcast_ref`.
    #[error("inner handler failed: {0}")]
    Handler(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The in-memory connection to the inner server failed for a reason other than the handler.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<hyper::Error>),

    /// The event could not be turned into an HTTP request.
    #[error("invalid synthetic request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<BoxError> for BridgeError {
    fn from(e: BoxError) -> Self {
        BridgeError::Handler(Arc::from(e))
    }
}

impl From<hyper::Error> for BridgeError {
    fn from(e: hyper::Error) -> Self {
        BridgeError::Transport(Arc::new(e))
    }
}

impl From<http::Error> for BridgeError {
    fn from(e: http::Error) -> Self {
        BridgeError::InvalidRequest(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
