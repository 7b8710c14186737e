//! [`Scheduler`] backed by tokio timers.
//!
//! Each armed timer is a small task that sleeps and then posts
//! [`GatewayInput::Timer`] to the gateway's channel.  Firing therefore goes
//! through the same queue as every other input, so a timer handler never runs
//! concurrently with anything else.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

use crate::application::ports::{Scheduler, TimerId, TimerKey};
use crate::infrastructure::gateway_task::GatewayInput;

pub struct TokioScheduler {
    inputs: UnboundedSender<GatewayInput>,
    origin: Instant,
    next_id: u64,
    armed: HashMap<TimerId, AbortHandle>,
}

impl TokioScheduler {
    pub fn new(inputs: UnboundedSender<GatewayInput>) -> Self {
        Self { inputs, origin: Instant::now(), next_id: 0, armed: HashMap::new() }
    }

    /// Forgets a timer whose input has been delivered.
    pub fn fired(&mut self, id: TimerId) {
        self.armed.remove(&id);
    }

    /// Aborts every armed timer.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.armed.drain() {
            handle.abort();
        }
    }

    pub fn armed(&self) -> usize {
        self.armed.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, key: TimerKey, after: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let inputs = self.inputs.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The gateway may already be shutting down.
            let _ = inputs.send(GatewayInput::Timer { id, key });
        });
        self.armed.insert(id, task.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.armed.remove(&id) {
            handle.abort();
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_posts_input_after_delay() {
        // Arrange
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut timers = TokioScheduler::new(tx);

        // Act
        let id = timers.schedule(TimerKey::Drive(3), Duration::from_millis(50));
        let input = rx.recv().await;

        // Assert
        assert!(matches!(input, Some(GatewayInput::Timer { id: got, key: TimerKey::Drive(3) }) if got == id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_posts() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut timers = TokioScheduler::new(tx);

        let cancelled = timers.schedule(TimerKey::CvTimeout, Duration::from_millis(10));
        timers.cancel(cancelled);
        let kept = timers.schedule(TimerKey::Heartbeat, Duration::from_millis(20));

        let input = rx.recv().await;
        assert!(matches!(input, Some(GatewayInput::Timer { id, .. }) if id == kept));
        assert_eq!(timers.armed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_are_never_reused() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut timers = TokioScheduler::new(tx);

        let a = timers.schedule(TimerKey::Heartbeat, Duration::from_secs(1));
        timers.cancel(a);
        let b = timers.schedule(TimerKey::Heartbeat, Duration::from_secs(1));

        assert_ne!(a, b);
        timers.cancel_all();
        assert_eq!(timers.armed(), 0);
    }
}
