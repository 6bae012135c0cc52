//! Cooperative cancellation for network and extraction work

use crate::error::{RegistryError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// A cloneable cancellation signal.
///
/// The CLI cancels it from its Ctrl+C handler; the registry checks it at every
/// network wait and between archive entries.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            state: Arc::new(CancellationState { tx, rx }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.rx.borrow()
    }

    /// Request cancellation. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        let _ = self.state.tx.send(true);
        debug!("Cancellation requested");
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.state.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run a future, aborting it with [`RegistryError::Cancelled`] if the token fires first
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            result = future => Ok(result),
            () = self.cancelled() => Err(RegistryError::Cancelled),
        }
    }

    /// Fail fast if cancellation was already requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RegistryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
