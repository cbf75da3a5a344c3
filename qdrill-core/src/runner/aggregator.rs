use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Bounded so a stalled aggregator applies back-pressure to consumers.
pub const REPORT_CHANNEL_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still running; `remaining` items are outstanding.
    Pending { remaining: i64 },
    /// This report finished the pass. Returned exactly once per tracker.
    Completed { remaining: i64 },
    /// The tracker was already done; the report did not change any state.
    Discarded,
}

/// Counts down the items a receive pass still expects.
///
/// Owned by a single task; nothing else mutates the counter.
#[derive(Debug)]
pub struct CompletionTracker {
    remaining: i64,
    consumed: u64,
    state: TrackerState,
}

impl CompletionTracker {
    #[must_use]
    pub fn new(expected: u64) -> Self {
        let remaining = i64::try_from(expected).unwrap_or(i64::MAX);
        Self {
            remaining,
            consumed: 0,
            state: if remaining <= 0 {
                TrackerState::Done
            } else {
                TrackerState::Running
            },
        }
    }

    pub fn record(&mut self, items: u64) -> Transition {
        if self.state == TrackerState::Done {
            return Transition::Discarded;
        }

        let items_i64 = i64::try_from(items).unwrap_or(i64::MAX);
        self.remaining = self.remaining.saturating_sub(items_i64);
        self.consumed = self.consumed.saturating_add(items);

        if self.remaining <= 0 {
            self.state = TrackerState::Done;
            Transition::Completed {
                remaining: self.remaining,
            }
        } else {
            Transition::Pending {
                remaining: self.remaining,
            }
        }
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == TrackerState::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorOutcome {
    /// The expected count was reached.
    Completed { remaining: i64, consumed: u64 },
    /// Every reporter went away before the expected count was reached.
    Starved { remaining: i64, consumed: u64 },
}

impl AggregatorOutcome {
    #[must_use]
    pub fn consumed(&self) -> u64 {
        match self {
            Self::Completed { consumed, .. } | Self::Starved { consumed, .. } => *consumed,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        match self {
            Self::Completed { remaining, .. } | Self::Starved { remaining, .. } => *remaining,
        }
    }
}

#[derive(Debug)]
pub struct AggregatorHandle {
    expected: u64,
    consumed: Arc<AtomicU64>,
    done: oneshot::Receiver<AggregatorOutcome>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Live count of reported items, for progress output.
    #[must_use]
    pub fn consumed_counter(&self) -> Arc<AtomicU64> {
        self.consumed.clone()
    }

    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        let expected = i64::try_from(self.expected).unwrap_or(i64::MAX);
        let consumed = i64::try_from(self.consumed()).unwrap_or(i64::MAX);
        expected.saturating_sub(consumed)
    }

    /// Resolves once the aggregator leaves the running state. Cancel-safe, so it can be
    /// raced against a timeout and awaited again.
    pub async fn wait(&mut self) -> Result<AggregatorOutcome> {
        (&mut self.done).await.map_err(|_| Error::AggregatorGone)
    }

    pub fn abort(self) {
        self.task.abort();
    }
}

/// Starts the task that owns the [`CompletionTracker`]. Batch sizes go into the returned
/// sender; the pass is starved once every clone of it is dropped.
#[must_use]
pub fn spawn_aggregator(expected: u64) -> (mpsc::Sender<u64>, AggregatorHandle) {
    let (reports_tx, reports_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();
    let consumed = Arc::new(AtomicU64::new(0));

    let task = tokio::spawn(aggregate(
        CompletionTracker::new(expected),
        reports_rx,
        consumed.clone(),
        done_tx,
    ));

    (
        reports_tx,
        AggregatorHandle {
            expected,
            consumed,
            done: done_rx,
            task,
        },
    )
}

async fn aggregate(
    mut tracker: CompletionTracker,
    mut reports: mpsc::Receiver<u64>,
    consumed: Arc<AtomicU64>,
    done: oneshot::Sender<AggregatorOutcome>,
) {
    if tracker.is_done() {
        let _ = done.send(AggregatorOutcome::Completed {
            remaining: tracker.remaining(),
            consumed: 0,
        });
        return;
    }

    while let Some(items) = reports.recv().await {
        let transition = tracker.record(items);
        consumed.store(tracker.consumed(), Ordering::Relaxed);

        if let Transition::Completed { remaining } = transition {
            tracing::debug!(remaining, consumed = tracker.consumed(), "receive pass complete");
            let _ = done.send(AggregatorOutcome::Completed {
                remaining,
                consumed: tracker.consumed(),
            });
            // Dropping the receiver closes the channel; later reports are refused there.
            return;
        }
    }

    tracing::warn!(
        remaining = tracker.remaining(),
        consumed = tracker.consumed(),
        "all consumers stopped before the receive pass completed"
    );
    let _ = done.send(AggregatorOutcome::Starved {
        remaining: tracker.remaining(),
        consumed: tracker.consumed(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_batches_of_ten_complete_on_the_tenth() {
        let mut t = CompletionTracker::new(100);
        for i in 1..10 {
            assert_eq!(
                t.record(10),
                Transition::Pending {
                    remaining: 100 - i * 10
                }
            );
        }
        assert_eq!(t.record(10), Transition::Completed { remaining: 0 });
        assert_eq!(t.remaining(), 0);
        assert!(t.is_done());
    }

    #[test]
    fn overshoot_completes_immediately_and_later_reports_are_discarded() {
        let mut t = CompletionTracker::new(3);
        assert_eq!(t.record(5), Transition::Completed { remaining: -2 });
        assert_eq!(t.record(4), Transition::Discarded);
        assert_eq!(t.remaining(), -2);
        assert_eq!(t.consumed(), 5);
        assert_eq!(t.state(), TrackerState::Done);
    }

    #[test]
    fn completes_exactly_once_when_cumulative_sum_first_reaches_expected() {
        let reports = [3u64, 0, 4, 2, 1, 7, 9];
        let mut t = CompletionTracker::new(10);
        let mut sum = 0u64;
        let mut completions = 0;

        for n in reports {
            let before = sum;
            sum += n;
            match t.record(n) {
                Transition::Completed { .. } => {
                    completions += 1;
                    assert!(before < 10 && sum >= 10);
                }
                Transition::Pending { .. } => assert!(sum < 10),
                Transition::Discarded => assert!(before >= 10),
            }
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn zero_expected_starts_done() {
        let mut t = CompletionTracker::new(0);
        assert!(t.is_done());
        assert_eq!(t.record(1), Transition::Discarded);
    }

    #[tokio::test]
    async fn task_signals_completion_and_refuses_later_reports() -> anyhow::Result<()> {
        let (tx, mut handle) = spawn_aggregator(100);
        for _ in 0..10 {
            tx.send(10).await?;
        }

        let outcome = handle.wait().await?;
        assert_eq!(
            outcome,
            AggregatorOutcome::Completed {
                remaining: 0,
                consumed: 100
            }
        );
        assert_eq!(handle.consumed(), 100);

        // The task is gone, so the channel closes and late reports are refused, not counted.
        tokio::task::yield_now().await;
        let mut refused = false;
        for _ in 0..100 {
            if tx.send(10).await.is_err() {
                refused = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(refused);
        assert_eq!(handle.consumed(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn task_reports_starvation_when_all_senders_drop() -> anyhow::Result<()> {
        let (tx, mut handle) = spawn_aggregator(50);
        tx.send(20).await?;
        drop(tx);

        let outcome = handle.wait().await?;
        assert_eq!(
            outcome,
            AggregatorOutcome::Starved {
                remaining: 30,
                consumed: 20
            }
        );
        assert_eq!(handle.remaining(), 30);
        Ok(())
    }
}
