//! One-shot completion signaling for asynchronous start/stop operations.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

/// Error returned by [`GateWaiter::wait`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("timed out waiting for completion")]
    Timeout,
}

/// A guarded, single-use signal reporting the outcome of one asynchronous
/// operation.
///
/// Three call sites race to resolve a gate: the domain success handler, the
/// domain failure handler, and an explicit user-initiated shutdown. The
/// sender slot can only be taken once, so whichever resolver arrives first
/// wins and every later attempt is a silent no-op.
#[derive(Debug, Default)]
pub struct CompletionGate {
    slot: Mutex<Option<oneshot::Sender<bool>>>,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the gate for a new operation and returns the waiter side.
    ///
    /// Re-arming replaces any stale sender from a previous operation; the old
    /// waiter, if still alive, observes `false`.
    pub fn arm(&self) -> GateWaiter {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(tx);
        GateWaiter { rx }
    }

    /// Resolves the gate with the given outcome.
    ///
    /// Returns `true` if this call performed the resolution, `false` if the
    /// gate was not armed or already resolved.
    pub fn resolve(&self, success: bool) -> bool {
        let sender = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        match sender {
            Some(tx) => {
                // A send failure just means the waiter gave up; the gate is
                // still considered resolved.
                let _ = tx.send(success);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_some()
    }
}

/// The waiter side of a [`CompletionGate`].
///
/// `wait` consumes the waiter, so a caller cannot wait twice on the same
/// armed gate.
#[derive(Debug)]
pub struct GateWaiter {
    rx: oneshot::Receiver<bool>,
}

impl GateWaiter {
    /// Blocks until the gate resolves or the timeout elapses.
    ///
    /// A gate dropped without resolution (its session went away) reports
    /// `false` rather than an error.
    pub async fn wait(self, timeout: Duration) -> Result<bool, GateError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Err(_) => Err(GateError::Timeout),
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_)) => Ok(false),
        }
    }
}
