use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::ReceiveOptions;
use crate::queue::{QueueClient, QueueError, QueueHandle};

#[derive(Debug)]
pub enum ConsumerExit {
    /// The cancellation flag was set between two polls.
    Cancelled,
    /// The aggregator stopped listening; the last acknowledged batch was not counted.
    ReportClosed,
    ReceiveFailed(QueueError),
    /// An acknowledge failed mid-batch. Earlier acknowledgements in the batch stand and the
    /// batch is not reported.
    AckFailed {
        acknowledged: usize,
        batch: usize,
        error: QueueError,
    },
}

impl ConsumerExit {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ReceiveFailed(_) | Self::AckFailed { .. })
    }
}

impl std::fmt::Display for ConsumerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::ReportClosed => f.write_str("report channel closed"),
            Self::ReceiveFailed(err) => write!(f, "receive failed: {err}"),
            Self::AckFailed {
                acknowledged,
                batch,
                error,
            } => write!(f, "acknowledge failed after {acknowledged}/{batch}: {error}"),
        }
    }
}

#[derive(Debug)]
pub struct ConsumerOutcome {
    pub worker: u64,
    /// Fully acknowledged and reported batches.
    pub batches: u64,
    pub consumed: u64,
    pub empty_polls: u64,
    pub exit: ConsumerExit,
}

#[derive(Debug, Default)]
pub struct ConsumerReport {
    pub workers: Vec<ConsumerOutcome>,
    /// Workers still parked in a poll when the shutdown grace ran out.
    pub aborted: u64,
}

impl ConsumerReport {
    pub fn failed_workers(&self) -> impl Iterator<Item = &ConsumerOutcome> {
        self.workers.iter().filter(|w| w.exit.is_failure())
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_workers().count()
    }

    /// Items acknowledged in batches that were never reported because an acknowledge failed.
    #[must_use]
    pub fn lost_acknowledged(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| match &w.exit {
                ConsumerExit::AckFailed { acknowledged, .. } => *acknowledged as u64,
                _ => 0,
            })
            .sum()
    }
}

/// Polls until cancelled or until a receive/acknowledge fails.
///
/// Every message of a batch is acknowledged before the batch size is reported.
pub async fn consume<Q: QueueClient>(
    client: Arc<Q>,
    queue: QueueHandle,
    opts: ReceiveOptions,
    worker: u64,
    reports: mpsc::Sender<u64>,
    cancel: watch::Receiver<bool>,
) -> ConsumerOutcome {
    let mut outcome = ConsumerOutcome {
        worker,
        batches: 0,
        consumed: 0,
        empty_polls: 0,
        exit: ConsumerExit::Cancelled,
    };

    loop {
        if *cancel.borrow() {
            tracing::debug!(worker, "consumer cancelled");
            outcome.exit = ConsumerExit::Cancelled;
            return outcome;
        }

        let batch = match client.receive(&queue, &opts).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::error!(worker, error = %err, "receive failed; consumer stopping");
                outcome.exit = ConsumerExit::ReceiveFailed(err);
                return outcome;
            }
        };

        if batch.is_empty() {
            outcome.empty_polls += 1;
            tracing::debug!(worker, "received no messages");
            continue;
        }

        let size = batch.len();
        for (acknowledged, message) in batch.iter().enumerate() {
            if let Err(err) = client.acknowledge(&queue, &message.receipt).await {
                tracing::error!(
                    worker,
                    message_id = %message.message_id,
                    acknowledged,
                    batch = size,
                    error = %err,
                    "acknowledge failed; consumer stopping"
                );
                outcome.exit = ConsumerExit::AckFailed {
                    acknowledged,
                    batch: size,
                    error: err,
                };
                return outcome;
            }
        }

        if reports.send(size as u64).await.is_err() {
            tracing::debug!(worker, batch = size, "receive pass already complete");
            outcome.exit = ConsumerExit::ReportClosed;
            return outcome;
        }

        outcome.batches += 1;
        outcome.consumed += size as u64;
    }
}
