use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Send,
    Receive,
}

/// Wall-clock numbers for one phase of a drill.
///
/// `avg_latency_ms` is derived from throughput (`1000 / rate`), not sampled per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseStats {
    pub phase: Phase,
    pub count: u64,
    pub elapsed: Duration,
    /// Items per second. `None` when no measurable time elapsed.
    pub rate: Option<f64>,
    /// `None` when the rate is undefined or zero.
    pub avg_latency_ms: Option<f64>,
}

impl PhaseStats {
    #[must_use]
    pub fn from_elapsed(phase: Phase, elapsed: Duration, count: u64) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = (secs > 0.0).then(|| count as f64 / secs);
        let avg_latency_ms = rate.filter(|r| *r > 0.0).map(|r| 1000.0 / r);

        Self {
            phase,
            count,
            elapsed,
            rate,
            avg_latency_ms,
        }
    }

    #[must_use]
    pub fn since(phase: Phase, started: Instant, count: u64) -> Self {
        Self::from_elapsed(phase, started.elapsed(), count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_and_latency_follow_throughput() {
        let s = PhaseStats::from_elapsed(Phase::Send, Duration::from_secs(2), 1000);
        assert_eq!(s.rate, Some(500.0));
        assert_eq!(s.avg_latency_ms, Some(2.0));
        assert_eq!(s.count, 1000);
        assert_eq!(s.phase, Phase::Send);
    }

    #[test]
    fn identical_inputs_give_identical_stats() {
        let a = PhaseStats::from_elapsed(Phase::Receive, Duration::from_millis(1234), 77);
        let b = PhaseStats::from_elapsed(Phase::Receive, Duration::from_millis(1234), 77);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_elapsed_leaves_rate_undefined() {
        let s = PhaseStats::from_elapsed(Phase::Send, Duration::ZERO, 0);
        assert_eq!(s.rate, None);
        assert_eq!(s.avg_latency_ms, None);

        let s = PhaseStats::from_elapsed(Phase::Send, Duration::ZERO, 10);
        assert_eq!(s.rate, None);
        assert_eq!(s.avg_latency_ms, None);
    }

    #[test]
    fn zero_count_has_zero_rate_and_no_latency() {
        let s = PhaseStats::from_elapsed(Phase::Receive, Duration::from_secs(1), 0);
        assert_eq!(s.rate, Some(0.0));
        assert_eq!(s.avg_latency_ms, None);
    }

    #[test]
    fn since_measures_from_start() {
        let started = Instant::now();
        let s = PhaseStats::since(Phase::Send, started, 5);
        assert_eq!(s.count, 5);
        assert!(s.elapsed <= started.elapsed());
    }

    #[test]
    fn phase_names_are_snake_case() {
        assert_eq!(Phase::Send.to_string(), "send");
        assert_eq!("receive".parse::<Phase>().ok(), Some(Phase::Receive));
    }
}
