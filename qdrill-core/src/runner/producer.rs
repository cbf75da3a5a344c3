use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{RemainderPolicy, RunConfig};
use crate::error::Result;
use crate::message::MessageTemplate;
use crate::queue::{QueueClient, QueueError, QueueHandle};

/// Per-worker message counts for `total` split across `workers`.
#[must_use]
pub fn split_shares(total: u64, workers: u64, policy: RemainderPolicy) -> Vec<u64> {
    if workers == 0 {
        return Vec::new();
    }

    let base = total / workers;
    let remainder = total % workers;

    (0..workers)
        .map(|worker| match policy {
            RemainderPolicy::Spread if worker < remainder => base + 1,
            RemainderPolicy::Spread | RemainderPolicy::Drop => base,
        })
        .collect()
}

#[derive(Debug)]
pub struct ProducerOutcome {
    pub worker: u64,
    pub assigned: u64,
    pub sent: u64,
    /// The send error that stopped this worker early.
    pub error: Option<QueueError>,
}

#[derive(Debug, Default)]
pub struct ProducerReport {
    pub workers: Vec<ProducerOutcome>,
    /// Messages never assigned because of [`RemainderPolicy::Drop`].
    pub dropped_remainder: u64,
}

impl ProducerReport {
    #[must_use]
    pub fn sent_total(&self) -> u64 {
        self.workers.iter().map(|w| w.sent).sum()
    }

    #[must_use]
    pub fn assigned_total(&self) -> u64 {
        self.workers.iter().map(|w| w.assigned).sum()
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = &ProducerOutcome> {
        self.workers.iter().filter(|w| w.error.is_some())
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_workers().count()
    }

    /// Messages assigned to a worker that aborted before sending them.
    #[must_use]
    pub fn unsent_total(&self) -> u64 {
        self.assigned_total().saturating_sub(self.sent_total())
    }
}

/// Sends `share` messages one after another. Stops at the first failed send.
pub async fn produce<Q: QueueClient>(
    client: Arc<Q>,
    queue: QueueHandle,
    template: Arc<MessageTemplate>,
    worker: u64,
    share: u64,
    sent_counter: Arc<AtomicU64>,
) -> ProducerOutcome {
    let mut sent = 0;

    for sequence in 0..share {
        let message = template.render(worker, sequence);
        if let Err(err) = client.send(&queue, &message).await {
            tracing::error!(
                worker,
                sequence,
                unsent = share - sent,
                error = %err,
                "send failed; producer stopping"
            );
            return ProducerOutcome {
                worker,
                assigned: share,
                sent,
                error: Some(err),
            };
        }

        sent += 1;
        sent_counter.fetch_add(1, Ordering::Relaxed);
    }

    tracing::debug!(worker, sent, "producer finished");
    ProducerOutcome {
        worker,
        assigned: share,
        sent,
        error: None,
    }
}

/// Runs one producer per configured worker and waits for all of them, whether they finish
/// their share or abort.
pub async fn run_producers<Q: QueueClient>(
    client: Arc<Q>,
    queue: &QueueHandle,
    template: Arc<MessageTemplate>,
    cfg: &RunConfig,
    sent_counter: Arc<AtomicU64>,
) -> Result<ProducerReport> {
    let shares = split_shares(cfg.total, cfg.producer_concurrency, cfg.remainder);
    let dropped_remainder = cfg.total.saturating_sub(shares.iter().sum());
    if dropped_remainder > 0 {
        tracing::warn!(
            total = cfg.total,
            producers = cfg.producer_concurrency,
            dropped = dropped_remainder,
            "total is not divisible by producers; remainder will not be sent"
        );
    }

    let mut handles = Vec::with_capacity(shares.len());
    for (worker, share) in (0u64..).zip(shares) {
        handles.push(tokio::spawn(produce(
            client.clone(),
            queue.clone(),
            template.clone(),
            worker,
            share,
            sent_counter.clone(),
        )));
    }

    let mut report = ProducerReport {
        workers: Vec::with_capacity(handles.len()),
        dropped_remainder,
    };
    let mut pending = handles.into_iter();
    while let Some(h) = pending.next() {
        match h.await {
            Ok(outcome) => report.workers.push(outcome),
            Err(err) => {
                // The report is lost either way; do not leave the rest sending behind it.
                pending.for_each(|h| h.abort());
                return Err(err.into());
            }
        }
    }

    Ok(report)
}
