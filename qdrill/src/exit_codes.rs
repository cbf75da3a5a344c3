use qdrill_core::runner::DrillReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// A producer or consumer failed, or every consumer stopped before the queue was drained.
    Degraded = 10,

    /// `--receive-timeout` elapsed before the expected count was received.
    ReceiveTimedOut = 11,

    /// Invalid CLI/config input (bad flags, durations, counts, endpoint, YAML).
    InvalidInput = 30,

    /// Queue setup failed, or an internal/runtime error (IO errors, panicked workers).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &DrillReport) -> Self {
        if report.timed_out() {
            Self::ReceiveTimedOut
        } else if report.is_degraded() {
            Self::Degraded
        } else {
            Self::Success
        }
    }
}
