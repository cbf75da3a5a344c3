use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::report::Phase;

/// Snapshot handed to the progress callback roughly once per second while a phase runs.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based), restarted for every phase.
    pub tick: u64,
    pub phase: Phase,
    pub elapsed: Duration,
    /// Time since the previous tick.
    pub interval: Duration,
    pub completed: u64,
    pub target: u64,
    /// Items completed during the last interval, per second.
    pub rate: f64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.target == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.target as f64).min(1.0)
    }
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

pub(crate) fn spawn_ticker(
    progress: ProgressFn,
    phase: Phase,
    started: Instant,
    completed: Arc<AtomicU64>,
    target: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick fires immediately; skip it so no ~0s sample is emitted.
        interval.tick().await;

        let mut tick: u64 = 0;
        let mut last_at = Instant::now();
        let mut last_completed = completed.load(Ordering::Relaxed);

        loop {
            interval.tick().await;

            tick = tick.saturating_add(1);
            let now = Instant::now();
            let dt = now.duration_since(last_at);
            last_at = now;

            let done = completed.load(Ordering::Relaxed);
            let delta = done.saturating_sub(last_completed);
            last_completed = done;

            let dt_secs = dt.as_secs_f64();
            let rate = if dt_secs > 0.0 {
                delta as f64 / dt_secs
            } else {
                0.0
            };

            (progress)(ProgressUpdate {
                tick,
                phase,
                elapsed: started.elapsed(),
                interval: dt,
                completed: done,
                target,
                rate,
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn fraction_is_clamped() {
        let mut u = ProgressUpdate {
            tick: 1,
            phase: Phase::Receive,
            elapsed: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            completed: 120,
            target: 100,
            rate: 120.0,
        };
        assert_eq!(u.fraction(), 1.0);
        u.completed = 25;
        assert_eq!(u.fraction(), 0.25);
        u.target = 0;
        assert_eq!(u.fraction(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_emits_after_the_first_second() -> anyhow::Result<()> {
        let seen: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |u| {
            sink.lock().unwrap_or_else(|p| p.into_inner()).push(u);
        });

        let completed = Arc::new(AtomicU64::new(0));
        let handle = spawn_ticker(progress, Phase::Send, Instant::now(), completed.clone(), 10);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(seen.lock().unwrap_or_else(|p| p.into_inner()).is_empty());

        completed.store(4, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(1600)).await;
        handle.abort();

        let seen = seen.lock().unwrap_or_else(|p| p.into_inner());
        assert!(!seen.is_empty());
        assert_eq!(seen[0].tick, 1);
        assert_eq!(seen[0].phase, Phase::Send);
        assert_eq!(seen[0].completed, 4);
        assert_eq!(seen[0].target, 10);
        Ok(())
    }
}
