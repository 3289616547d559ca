//! Delivers the outcome of an invocation to the caller's callback exactly once.

use crate::error::BridgeError;
use crate::response::ProxyResponse;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, error};

/// The result of one proxied request/response cycle.
pub type Outcome = Result<ProxyResponse, BridgeError>;

/// A single-use sink for the outcome of an invocation.
/// `Ok(response)` is the `(null, response)` case, `Err(error)` is `(error, undefined)`.
pub struct CompletionCallback(Box<dyn FnOnce(Outcome) + Send + 'static>);

impl CompletionCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Creates a callback that forwards the outcome into a oneshot channel.
    /// The receiver is how an async caller waits for the callback to fire.
    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let callback = Self::new(move |outcome| {
            if tx.send(outcome).is_err() {
                error!("The outcome receiver was dropped before the invocation completed");
            }
        });
        (callback, rx)
    }

    fn call(self, outcome: Outcome) {
        (self.0)(outcome)
    }
}

impl std::fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompletionCallback")
    }
}

/// Lifecycle of one invocation as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    Resolved,
    Rejected,
}

struct Inner {
    state: CompletionState,
    callback: Option<CompletionCallback>,
}

/// Wraps the callback so that it fires at most once no matter how many completion paths
/// report an outcome. The first outcome wins, the rest are dropped.
///
/// Clones share the same callback.
#[derive(Clone)]
pub struct CompletionBridge {
    inner: Arc<Mutex<Inner>>,
}

impl CompletionBridge {
    pub fn new(callback: CompletionCallback) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CompletionState::Pending,
                callback: Some(callback),
            })),
        }
    }

    /// Passes the outcome to the callback if no outcome was delivered before.
    /// Returns true if this call invoked the callback.
    pub fn complete(&self, outcome: Outcome) -> bool {
        // take the callback out under the lock, but call it outside of it
        let callback = {
            let mut inner = match self.inner.lock() {
                Ok(v) => v,
                Err(poisoned) => poisoned.into_inner(),
            };

            match inner.callback.take() {
                Some(callback) => {
                    inner.state = match outcome {
                        Ok(_) => CompletionState::Resolved,
                        Err(_) => CompletionState::Rejected,
                    };
                    callback
                }
                None => {
                    debug!("Invocation already completed as {:?}, dropping {:?}", inner.state, outcome);
                    return false;
                }
            }
        };

        callback.call(outcome);
        true
    }

    pub fn state(&self) -> CompletionState {
        match self.inner.lock() {
            Ok(v) => v.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }
}

impl std::fmt::Debug for CompletionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionBridge").field("state", &self.state()).finish()
    }
}
