//! In-process queue with visibility timeouts.
//!
//! Backs `memory://` dry runs, the HTTP test queue, and the driver tests. Fault hooks let
//! tests make specific sends, receives or acknowledgements fail.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{QueueClient, QueueError, QueueHandle, ReceiptToken, ReceivedMessage, SendReceipt};
use crate::config::{MAX_BATCH_SIZE, ReceiveOptions};
use crate::message::Message;

type SendFault = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Default)]
struct Faults {
    send: Option<SendFault>,
    acks_after: Option<u64>,
    receives_after: Option<u64>,
}

impl fmt::Debug for Faults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Faults")
            .field("send", &self.send.is_some())
            .field("acks_after", &self.acks_after)
            .field("receives_after", &self.receives_after)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueueStats {
    sent_total: AtomicU64,
    received_total: AtomicU64,
    acked_total: AtomicU64,
    receive_calls: AtomicU64,
    ack_calls: AtomicU64,
}

impl MemoryQueueStats {
    pub fn sent_total(&self) -> u64 {
        self.sent_total.load(Ordering::Relaxed)
    }

    /// Deliveries, including redeliveries after a visibility timeout.
    pub fn received_total(&self) -> u64 {
        self.received_total.load(Ordering::Relaxed)
    }

    pub fn acked_total(&self) -> u64 {
        self.acked_total.load(Ordering::Relaxed)
    }

    pub fn receive_calls(&self) -> u64 {
        self.receive_calls.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Stored {
    id: String,
    message: Message,
}

#[derive(Debug)]
struct InFlight {
    stored: Stored,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Stored>,
    in_flight: HashMap<Arc<str>, InFlight>,
}

impl QueueState {
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<Arc<str>> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(f) = self.in_flight.remove(&receipt) {
                self.ready.push_front(f.stored);
            }
        }
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.visible_at).min()
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    available: Notify,
    faults: Faults,
    stats: MemoryQueueStats,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_queue(self, name: impl Into<String>) -> Self {
        self.create_queue(name);
        self
    }

    /// Fail every send whose message matches `pred` (permanent error, nothing is enqueued).
    #[must_use]
    pub fn fail_sends_where(
        mut self,
        pred: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.faults.send = Some(Arc::new(pred));
        self
    }

    /// Let the first `n` acknowledge calls through, fail every later one.
    #[must_use]
    pub fn fail_acks_after(mut self, n: u64) -> Self {
        self.faults.acks_after = Some(n);
        self
    }

    /// Let the first `n` receive calls through, fail every later one.
    #[must_use]
    pub fn fail_receives_after(mut self, n: u64) -> Self {
        self.faults.receives_after = Some(n);
        self
    }

    pub fn create_queue(&self, name: impl Into<String>) {
        self.lock().entry(name.into()).or_default();
    }

    pub fn stats(&self) -> &MemoryQueueStats {
        &self.stats
    }

    /// Messages currently visible in `queue` (0 for unknown queues).
    pub fn ready_len(&self, queue: &str) -> usize {
        self.lock().get(queue).map_or(0, |q| q.ready.len())
    }

    /// Messages received but neither acknowledged nor expired yet.
    pub fn in_flight_len(&self, queue: &str) -> usize {
        self.lock().get(queue).map_or(0, |q| q.in_flight.len())
    }

    /// Copies of the currently visible messages, in delivery order.
    pub fn ready_messages(&self, queue: &str) -> Vec<Message> {
        self.lock().get(queue).map_or_else(Vec::new, |q| {
            q.ready.iter().map(|s| s.message.clone()).collect()
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unknown_queue(queue: &str) -> QueueError {
    QueueError::NotFound(format!("queue `{queue}` does not exist"))
}

impl QueueClient for MemoryQueue {
    async fn resolve_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
        if self.lock().contains_key(name) {
            Ok(QueueHandle::new(name))
        } else {
            Err(unknown_queue(name))
        }
    }

    async fn send(&self, queue: &QueueHandle, message: &Message) -> Result<SendReceipt, QueueError> {
        if let Some(fault) = &self.faults.send
            && fault(message)
        {
            return Err(QueueError::Permanent("injected send failure".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        {
            let mut queues = self.lock();
            let state = queues
                .get_mut(queue.as_str())
                .ok_or_else(|| unknown_queue(queue.as_str()))?;
            state.ready.push_back(Stored {
                id: id.clone(),
                message: message.clone(),
            });
        }

        self.stats.sent_total.fetch_add(1, Ordering::Relaxed);
        self.available.notify_waiters();

        Ok(SendReceipt { message_id: id })
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        opts: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let call = self.stats.receive_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(limit) = self.faults.receives_after
            && call >= limit
        {
            return Err(QueueError::Transient(
                "injected receive failure".to_string(),
            ));
        }

        let max_batch = opts.max_batch.clamp(1, MAX_BATCH_SIZE) as usize;
        let deadline = Instant::now() + opts.wait_time;

        loop {
            // Register interest before looking at the queue so a send in between isn't missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let (batch, next_visible_at) = {
                let mut queues = self.lock();
                let state = queues
                    .get_mut(queue.as_str())
                    .ok_or_else(|| unknown_queue(queue.as_str()))?;
                state.requeue_expired(now);

                let mut batch = Vec::new();
                while batch.len() < max_batch {
                    let Some(stored) = state.ready.pop_front() else {
                        break;
                    };
                    let receipt: Arc<str> = Arc::from(Uuid::new_v4().to_string());
                    batch.push(ReceivedMessage {
                        message_id: stored.id.clone(),
                        body: stored.message.body.clone(),
                        receipt: ReceiptToken::new(receipt.clone()),
                    });
                    state.in_flight.insert(
                        receipt,
                        InFlight {
                            stored,
                            visible_at: now + opts.visibility_timeout,
                        },
                    );
                }

                (batch, state.next_visible_at())
            };

            if !batch.is_empty() {
                self.stats
                    .received_total
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                return Ok(batch);
            }

            if now >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible_at.map_or(deadline, |t| t.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn acknowledge(
        &self,
        queue: &QueueHandle,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let call = self.stats.ack_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(limit) = self.faults.acks_after
            && call >= limit
        {
            return Err(QueueError::Transient(
                "injected acknowledge failure".to_string(),
            ));
        }

        let now = Instant::now();
        let mut queues = self.lock();
        let state = queues
            .get_mut(queue.as_str())
            .ok_or_else(|| unknown_queue(queue.as_str()))?;

        match state.in_flight.remove(receipt.as_str()) {
            Some(f) if f.visible_at > now => {
                self.stats.acked_total.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Some(f) => {
                state.ready.push_front(f.stored);
                Err(QueueError::NotFound(format!(
                    "receipt `{}` expired",
                    receipt.as_str()
                )))
            }
            None => Err(QueueError::NotFound(format!(
                "receipt `{}` is not in flight",
                receipt.as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::MessageTemplate;

    fn quick(max_batch: u32) -> ReceiveOptions {
        ReceiveOptions {
            max_batch,
            wait_time: Duration::from_millis(20),
            visibility_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn send_receive_acknowledge() -> Result<(), QueueError> {
        let q = MemoryQueue::new().with_queue("jobs");
        let handle = q.resolve_queue("jobs").await?;
        let template = MessageTemplate::new("hello");

        for seq in 0..3 {
            q.send(&handle, &template.render(0, seq)).await?;
        }
        assert_eq!(q.ready_len("jobs"), 3);

        let batch = q.receive(&handle, &quick(2)).await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(q.ready_len("jobs"), 1);
        assert_eq!(q.in_flight_len("jobs"), 2);

        for m in &batch {
            q.acknowledge(&handle, &m.receipt).await?;
        }
        assert_eq!(q.in_flight_len("jobs"), 0);
        assert_eq!(q.stats().acked_total(), 2);

        // Acknowledging twice is reported, not silently accepted.
        let again = q.acknowledge(&handle, &batch[0].receipt).await;
        assert!(matches!(again, Err(QueueError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_unknown_queue_is_not_found() {
        let q = MemoryQueue::new();
        assert!(matches!(
            q.resolve_queue("missing").await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_receive_returns_after_wait_time() -> Result<(), QueueError> {
        let q = MemoryQueue::new().with_queue("jobs");
        let handle = q.resolve_queue("jobs").await?;
        let started = std::time::Instant::now();
        let batch = q.receive(&handle, &quick(10)).await?;
        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(15));
        Ok(())
    }

    #[tokio::test]
    async fn long_poll_wakes_up_on_send() -> Result<(), QueueError> {
        let q = Arc::new(MemoryQueue::new().with_queue("jobs"));
        let handle = q.resolve_queue("jobs").await?;

        let receiver = {
            let q = q.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                let opts = ReceiveOptions {
                    max_batch: 10,
                    wait_time: Duration::from_secs(5),
                    visibility_timeout: Duration::from_secs(30),
                };
                q.receive(&handle, &opts).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.send(&handle, &Message::new("late")).await?;

        let batch = match tokio::time::timeout(Duration::from_secs(2), receiver).await {
            Ok(Ok(res)) => res?,
            other => panic!("receiver did not wake up: {other:?}"),
        };
        assert_eq!(batch.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn expired_messages_are_redelivered() -> Result<(), QueueError> {
        let q = MemoryQueue::new().with_queue("jobs");
        let handle = q.resolve_queue("jobs").await?;
        q.send(&handle, &Message::new("once")).await?;

        let opts = ReceiveOptions {
            max_batch: 10,
            wait_time: Duration::from_millis(200),
            visibility_timeout: Duration::from_millis(10),
        };
        let first = q.receive(&handle, &opts).await?;
        assert_eq!(first.len(), 1);

        let second = q.receive(&handle, &opts).await?;
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].message_id, second[0].message_id);
        assert_ne!(first[0].receipt, second[0].receipt);

        let stale = q.acknowledge(&handle, &first[0].receipt).await;
        assert!(matches!(stale, Err(QueueError::NotFound(_))));
        assert_eq!(q.stats().received_total(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn fault_hooks_fail_selected_calls() -> Result<(), QueueError> {
        let q = MemoryQueue::new()
            .with_queue("jobs")
            .fail_sends_where(|m| m.sequence() == Some(1))
            .fail_acks_after(1)
            .fail_receives_after(1);
        let handle = q.resolve_queue("jobs").await?;
        let template = MessageTemplate::new("x");

        q.send(&handle, &template.render(0, 0)).await?;
        assert!(matches!(
            q.send(&handle, &template.render(0, 1)).await,
            Err(QueueError::Permanent(_))
        ));
        q.send(&handle, &template.render(0, 2)).await?;
        assert_eq!(q.stats().sent_total(), 2);

        let batch = q.receive(&handle, &quick(10)).await?;
        assert_eq!(batch.len(), 2);
        q.acknowledge(&handle, &batch[0].receipt).await?;
        let err = q.acknowledge(&handle, &batch[1].receipt).await;
        assert!(matches!(err, Err(QueueError::Transient(_))));

        let err = q.receive(&handle, &quick(10)).await;
        assert!(matches!(err, Err(QueueError::Transient(_))));
        Ok(())
    }
}
