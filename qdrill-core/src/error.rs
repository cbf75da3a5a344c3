use crate::config::{MAX_BATCH_SIZE, MAX_WAIT_TIME};
use crate::queue::QueueError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to resolve queue `{queue}`: {source}")]
    Setup {
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error("completion aggregator stopped without reporting an outcome")]
    AggregatorGone,

    #[error("`total` must be a positive integer")]
    InvalidTotal,

    #[error("`producers` must be a positive integer")]
    InvalidProducers,

    #[error("`consumers` must be a positive integer")]
    InvalidConsumers,

    #[error("`queue` must not be empty")]
    InvalidQueueName,

    #[error("`batch_size` must be between 1 and {MAX_BATCH_SIZE}")]
    InvalidBatchSize,

    #[error("`wait_time` must be at most {MAX_WAIT_TIME:?}")]
    InvalidWaitTime,

    #[error("`visibility_timeout` must be a positive duration")]
    InvalidVisibilityTimeout,

    #[error("`receive_timeout` must be a positive duration")]
    InvalidReceiveTimeout,

    #[error("nothing to run: both the send and the receive phase are skipped")]
    NothingToRun,
}

impl Error {
    /// True for errors caused by the drill configuration rather than the queue or runtime.
    #[must_use]
    pub fn is_invalid_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidTotal
                | Self::InvalidProducers
                | Self::InvalidConsumers
                | Self::InvalidQueueName
                | Self::InvalidBatchSize
                | Self::InvalidWaitTime
                | Self::InvalidVisibilityTimeout
                | Self::InvalidReceiveTimeout
                | Self::NothingToRun
        )
    }
}
