//! Bridges callback-style transport commands into awaitable results.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::ports::PortError;

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<Result<T, PortError>>>>>;

/// Completion handle handed to a transport command.
///
/// Clones share one slot. The first `complete` resolves the waiting side and
/// closes the channel; every later call is a no-op.
pub struct Completion<T> {
    slot: Slot<T>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> Completion<T> {
    /// Returns `true` only for the call that actually resolved the command.
    pub fn complete(&self, result: Result<T, PortError>) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn success(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    pub fn failure(&self, error: PortError) -> bool {
        self.complete(Err(error))
    }

    pub fn is_completed(&self) -> bool {
        match self.slot.lock() {
            Ok(g) => g.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Starts a callback-style command and waits for its first completion.
///
/// No timeout is applied here; callers wrap the future when they need one.
pub async fn bridge<T, F>(start: F) -> Result<T, PortError>
where
    F: FnOnce(Completion<T>),
{
    let (tx, rx) = oneshot::channel();
    start(Completion {
        slot: Arc::new(Mutex::new(Some(tx))),
    });
    rx.await
        .map_err(|_| PortError::Transport("transport dropped the callback".to_owned()))?
}
