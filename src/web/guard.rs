//! Single-response guarantee
//!
//! The dispatch task and the deadline task race to publish the outcome of a
//! request through one [`ResponseGate`]. Whoever publishes first wins; the
//! other publication is refused.

use super::error::GatewayError;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Outcome = Result<Value, GatewayError>;

/// Single-fire completion slot shared by the racers of one request
#[derive(Debug)]
pub struct ResponseGate {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl ResponseGate {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (sender, receiver) = oneshot::channel();
        let gate = Arc::new(Self {
            sender: Mutex::new(Some(sender)),
        });
        (gate, receiver)
    }

    /// Returns `false` if an outcome was already published.
    pub fn publish(&self, outcome: Outcome) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            // the receiver may be gone if the client disconnected; the
            // publication still counts as the one response
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.sender.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Deadline task of one request. Dropping the guard cancels the timer.
#[derive(Debug)]
pub struct TimeoutGuard {
    timer: JoinHandle<()>,
}

impl TimeoutGuard {
    pub fn arm(gate: Arc<ResponseGate>, timeout: Duration, request_id: u64) -> Self {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            if gate.publish(Err(GatewayError::Timeout { timeout_ms })) {
                warn!(request_id, timeout_ms, "request timed out");
            } else {
                debug!(request_id, "deadline reached after the response was sent");
            }
        });

        Self { timer }
    }

    /// Cancels the pending deadline
    pub fn disarm(self) {}
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_publication_wins() {
        let (gate, receiver) = ResponseGate::new();
        assert!(gate.publish(Ok(json!(1))));
        assert!(!gate.publish(Ok(json!(2))));
        assert!(gate.is_closed());
        assert_eq!(receiver.await.unwrap(), Ok(json!(1)));
    }

    #[tokio::test]
    async fn test_deadline_fires_once() {
        let (gate, receiver) = ResponseGate::new();
        let guard = TimeoutGuard::arm(Arc::clone(&gate), Duration::from_millis(10), 7);

        let outcome = receiver.await.unwrap();
        assert_eq!(outcome, Err(GatewayError::Timeout { timeout_ms: 10 }));
        assert!(!gate.publish(Ok(json!("late"))));
        guard.disarm();
    }

    #[tokio::test]
    async fn test_disarmed_guard_never_fires() {
        let (gate, _receiver) = ResponseGate::new();
        let guard = TimeoutGuard::arm(Arc::clone(&gate), Duration::from_millis(10), 8);
        guard.disarm();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!gate.is_closed());
        assert!(gate.publish(Ok(json!("done"))));
    }
}
