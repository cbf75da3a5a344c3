mod aggregator;
mod consumer;
mod drill;
mod producer;
mod progress;
mod report;

pub use aggregator::{
    AggregatorHandle, AggregatorOutcome, CompletionTracker, REPORT_CHANNEL_CAPACITY,
    TrackerState, Transition, spawn_aggregator,
};
pub use consumer::{ConsumerExit, ConsumerOutcome, ConsumerReport, consume};
pub use drill::{DrillReport, ReceiveOutcome, ReceivePhaseReport, SendPhaseReport, run_drill};
pub use producer::{ProducerOutcome, ProducerReport, produce, run_producers, split_shares};
pub use progress::{ProgressFn, ProgressUpdate};
pub use report::{Phase, PhaseStats};
