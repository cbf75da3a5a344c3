use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use tokio::sync::watch;

use super::aggregator::{AggregatorOutcome, spawn_aggregator};
use super::consumer::{ConsumerReport, consume};
use super::producer::{ProducerReport, run_producers};
use super::progress::{ProgressFn, spawn_ticker};
use super::report::{Phase, PhaseStats};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::message::MessageTemplate;
use crate::queue::{QueueClient, QueueHandle};

#[derive(Debug)]
pub struct SendPhaseReport {
    pub stats: PhaseStats,
    pub producers: ProducerReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReceiveOutcome {
    Completed { remaining: i64 },
    /// Every consumer stopped before the expected count was reached.
    Starved { remaining: i64 },
    /// `receive_timeout` elapsed first.
    TimedOut { remaining: i64 },
}

impl ReceiveOutcome {
    #[must_use]
    pub fn remaining(&self) -> i64 {
        match self {
            Self::Completed { remaining }
            | Self::Starved { remaining }
            | Self::TimedOut { remaining } => *remaining,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug)]
pub struct ReceivePhaseReport {
    pub stats: PhaseStats,
    pub outcome: ReceiveOutcome,
    pub consumers: ConsumerReport,
}

#[derive(Debug)]
pub struct DrillReport {
    pub queue: QueueHandle,
    /// `None` when the send phase was skipped.
    pub send: Option<SendPhaseReport>,
    /// `None` when the receive phase was skipped.
    pub receive: Option<ReceivePhaseReport>,
}

impl DrillReport {
    /// Any worker failed, or the receive phase ended without consuming the expected count.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        let send_degraded = self
            .send
            .as_ref()
            .is_some_and(|s| s.producers.failed_count() > 0);
        let receive_degraded = self
            .receive
            .as_ref()
            .is_some_and(|r| !r.outcome.is_complete() || r.consumers.failed_count() > 0);
        send_degraded || receive_degraded
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.receive
            .as_ref()
            .is_some_and(|r| matches!(r.outcome, ReceiveOutcome::TimedOut { .. }))
    }
}

/// Runs the two-phase drill: send `total` messages with the producer pool, then drain
/// `total` messages with the consumer pool.
///
/// Worker failures never abort the drill; they show up in the returned report. Only an
/// invalid config, an unresolvable queue or a panicked task end it with an error.
pub async fn run_drill<Q: QueueClient>(
    client: Arc<Q>,
    cfg: &RunConfig,
    template: Arc<MessageTemplate>,
    progress: Option<ProgressFn>,
) -> Result<DrillReport> {
    cfg.validate()?;

    let queue = client
        .resolve_queue(&cfg.queue)
        .await
        .map_err(|source| Error::Setup {
            queue: cfg.queue.clone(),
            source,
        })?;
    tracing::info!(queue = %queue, "resolved queue");

    let send = if cfg.skip_send {
        tracing::info!("send phase skipped");
        None
    } else {
        Some(send_phase(&client, &queue, template, cfg, progress.as_ref()).await?)
    };

    let receive = if cfg.skip_receive {
        tracing::info!("receive phase skipped");
        None
    } else {
        Some(receive_phase(&client, &queue, cfg, progress.as_ref()).await?)
    };

    Ok(DrillReport {
        queue,
        send,
        receive,
    })
}

async fn send_phase<Q: QueueClient>(
    client: &Arc<Q>,
    queue: &QueueHandle,
    template: Arc<MessageTemplate>,
    cfg: &RunConfig,
    progress: Option<&ProgressFn>,
) -> Result<SendPhaseReport> {
    tracing::info!(
        total = cfg.total,
        producers = cfg.producer_concurrency,
        remainder = %cfg.remainder,
        "send phase started"
    );

    let sent = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    let ticker = progress
        .map(|p| spawn_ticker(p.clone(), Phase::Send, started, sent.clone(), cfg.total));

    let producers = run_producers(client.clone(), queue, template, cfg, sent).await;
    if let Some(t) = ticker {
        t.abort();
    }
    let producers = producers?;

    let stats = PhaseStats::since(Phase::Send, started, producers.sent_total());
    tracing::info!(
        sent = stats.count,
        failed_workers = producers.failed_count(),
        elapsed = ?stats.elapsed,
        "send phase finished"
    );

    Ok(SendPhaseReport { stats, producers })
}

async fn receive_phase<Q: QueueClient>(
    client: &Arc<Q>,
    queue: &QueueHandle,
    cfg: &RunConfig,
    progress: Option<&ProgressFn>,
) -> Result<ReceivePhaseReport> {
    tracing::info!(
        expected = cfg.total,
        consumers = cfg.consumer_concurrency,
        "receive phase started"
    );

    let started = Instant::now();
    let (reports, mut aggregator) = spawn_aggregator(cfg.total);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ticker = progress.map(|p| {
        spawn_ticker(
            p.clone(),
            Phase::Receive,
            started,
            aggregator.consumed_counter(),
            cfg.total,
        )
    });

    let mut handles = Vec::new();
    for worker in 0..cfg.consumer_concurrency {
        handles.push(tokio::spawn(consume(
            client.clone(),
            queue.clone(),
            cfg.receive.clone(),
            worker,
            reports.clone(),
            cancel_rx.clone(),
        )));
    }
    // Only consumers hold senders now, so the aggregator notices when they are all gone.
    drop(reports);

    let waited = match cfg.receive_timeout {
        Some(limit) => tokio::time::timeout(limit, aggregator.wait()).await.ok(),
        None => Some(aggregator.wait().await),
    };
    let outcome = match waited {
        Some(Ok(AggregatorOutcome::Completed { remaining, .. })) => {
            ReceiveOutcome::Completed { remaining }
        }
        Some(Ok(AggregatorOutcome::Starved { remaining, .. })) => {
            ReceiveOutcome::Starved { remaining }
        }
        Some(Err(err)) => {
            cancel_consumers(&cancel_tx, handles);
            return Err(err);
        }
        None => {
            tracing::warn!(
                remaining = aggregator.remaining(),
                "receive timeout elapsed before the expected count was consumed"
            );
            ReceiveOutcome::TimedOut {
                remaining: aggregator.remaining(),
            }
        }
    };

    let stats = PhaseStats::since(Phase::Receive, started, aggregator.consumed());
    if let Some(t) = ticker {
        t.abort();
    }

    let _ = cancel_tx.send(true);
    let mut consumers = ConsumerReport {
        workers: Vec::with_capacity(handles.len()),
        aborted: 0,
    };
    let deadline = tokio::time::Instant::now() + cfg.shutdown_grace;
    let mut pending = handles.into_iter();
    while let Some(mut h) = pending.next() {
        match tokio::time::timeout_at(deadline, &mut h).await {
            Ok(Ok(outcome)) => consumers.workers.push(outcome),
            Ok(Err(err)) => {
                pending.for_each(|h| h.abort());
                aggregator.abort();
                return Err(err.into());
            }
            Err(_) => {
                h.abort();
                consumers.aborted += 1;
            }
        }
    }
    aggregator.abort();

    if consumers.aborted > 0 {
        tracing::debug!(
            aborted = consumers.aborted,
            "aborted consumers still waiting on a poll"
        );
    }
    tracing::info!(
        consumed = stats.count,
        outcome = %outcome,
        failed_workers = consumers.failed_count(),
        elapsed = ?stats.elapsed,
        "receive phase finished"
    );

    Ok(ReceivePhaseReport {
        stats,
        outcome,
        consumers,
    })
}

fn cancel_consumers<T>(cancel: &watch::Sender<bool>, handles: Vec<tokio::task::JoinHandle<T>>) {
    let _ = cancel.send(true);
    for h in handles {
        h.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::result::Result;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::config::ReceiveOptions;
    use crate::message::Message;
    use crate::queue::{MemoryQueue, QueueError, ReceiptToken, ReceivedMessage, SendReceipt};

    struct InFlight(Arc<AtomicU64>);

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// The first receive panics; every later one parks in a long poll that ignores cancellation.
    #[derive(Default)]
    struct PanicThenPark {
        receives: AtomicU64,
        in_flight: Arc<AtomicU64>,
    }

    impl QueueClient for PanicThenPark {
        async fn resolve_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
            Ok(QueueHandle::new(name))
        }

        async fn send(
            &self,
            _queue: &QueueHandle,
            _message: &Message,
        ) -> Result<SendReceipt, QueueError> {
            Ok(SendReceipt {
                message_id: "m".to_string(),
            })
        }

        async fn receive(
            &self,
            _queue: &QueueHandle,
            _opts: &ReceiveOptions,
        ) -> Result<Vec<ReceivedMessage>, QueueError> {
            assert_ne!(self.receives.fetch_add(1, Ordering::SeqCst), 0, "first poll blew up");
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let _guard = InFlight(self.in_flight.clone());
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        async fn acknowledge(
            &self,
            _queue: &QueueHandle,
            _receipt: &ReceiptToken,
        ) -> Result<(), QueueError> {
            Ok(())
        }
    }

    fn quick(total: u64, producers: u64, consumers: u64) -> RunConfig {
        let mut cfg = RunConfig::new(total, producers, consumers, "drill");
        cfg.receive.wait_time = Duration::from_millis(20);
        cfg.shutdown_grace = Duration::from_millis(500);
        cfg
    }

    #[tokio::test]
    async fn invalid_config_starts_nothing() -> anyhow::Result<()> {
        let q = Arc::new(MemoryQueue::new().with_queue("drill"));
        let err = run_drill(q.clone(), &quick(0, 1, 1), Arc::default(), None)
            .await
            .err();
        assert!(err.is_some_and(|e| e.is_invalid_config()));
        assert_eq!(q.stats().sent_total(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_queue_is_a_setup_error() -> anyhow::Result<()> {
        let q = Arc::new(MemoryQueue::new());
        let err = run_drill(q.clone(), &quick(10, 1, 1), Arc::default(), None)
            .await
            .err();
        assert!(matches!(err, Some(Error::Setup { .. })));
        assert_eq!(q.stats().sent_total(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn send_only_leaves_messages_on_the_queue() -> anyhow::Result<()> {
        let q = Arc::new(MemoryQueue::new().with_queue("drill"));
        let mut cfg = quick(30, 3, 1);
        cfg.skip_receive = true;

        let report = run_drill(q.clone(), &cfg, Arc::default(), None).await?;
        assert!(report.receive.is_none());
        assert_eq!(report.send.as_ref().map(|s| s.stats.count), Some(30));
        assert_eq!(q.ready_len("drill"), 30);
        assert!(!report.is_degraded());
        Ok(())
    }

    #[tokio::test]
    async fn panicked_consumer_aborts_the_parked_ones() -> anyhow::Result<()> {
        let client = Arc::new(PanicThenPark::default());
        let mut cfg = quick(10, 1, 4);
        cfg.skip_send = true;
        cfg.receive_timeout = Some(Duration::from_millis(100));
        cfg.shutdown_grace = Duration::from_millis(300);

        let err = run_drill(client.clone(), &cfg, Arc::default(), None)
            .await
            .err();
        assert!(matches!(err, Some(Error::Join(_))), "got {err:?}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.in_flight.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(ReceiveOutcome::Completed { remaining: 0 }.to_string(), "completed");
        assert_eq!(ReceiveOutcome::TimedOut { remaining: 3 }.to_string(), "timed_out");
        assert_eq!(ReceiveOutcome::Starved { remaining: 3 }.remaining(), 3);
    }
}
