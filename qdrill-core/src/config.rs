use std::time::Duration;

use crate::error::{Error, Result};

/// Upper bound managed queues put on a single receive call.
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest long-poll wait managed queues accept on a receive call.
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

/// What to do with `total % producers` when the volume doesn't split evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RemainderPolicy {
    /// The first `total % producers` workers send one extra message.
    #[default]
    Spread,
    /// Every worker sends `total / producers`; the remainder is never sent.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Max messages requested per receive call (1..=10).
    pub max_batch: u32,
    /// Long-poll wait per receive call.
    pub wait_time: Duration,
    /// How long a received message stays invisible to other consumers.
    pub visibility_timeout: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_batch: MAX_BATCH_SIZE,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(20),
        }
    }
}

/// Shape of a single drill. Built once at startup and never mutated during a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub total: u64,
    pub producer_concurrency: u64,
    pub consumer_concurrency: u64,
    pub queue: String,
    pub remainder: RemainderPolicy,
    pub receive: ReceiveOptions,

    /// Upper bound for the receive phase. `None` waits until the expected count is consumed
    /// or every consumer has stopped.
    pub receive_timeout: Option<Duration>,

    /// How long consumers get to finish their in-flight poll once the receive phase is done.
    pub shutdown_grace: Duration,

    pub skip_send: bool,
    pub skip_receive: bool,
}

impl RunConfig {
    pub fn new(
        total: u64,
        producer_concurrency: u64,
        consumer_concurrency: u64,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            total,
            producer_concurrency,
            consumer_concurrency,
            queue: queue.into(),
            remainder: RemainderPolicy::default(),
            receive: ReceiveOptions::default(),
            receive_timeout: None,
            shutdown_grace: Duration::from_secs(2),
            skip_send: false,
            skip_receive: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.total == 0 {
            return Err(Error::InvalidTotal);
        }
        if self.producer_concurrency == 0 {
            return Err(Error::InvalidProducers);
        }
        if self.consumer_concurrency == 0 {
            return Err(Error::InvalidConsumers);
        }
        if self.queue.trim().is_empty() {
            return Err(Error::InvalidQueueName);
        }
        if self.receive.max_batch == 0 || self.receive.max_batch > MAX_BATCH_SIZE {
            return Err(Error::InvalidBatchSize);
        }
        if self.receive.wait_time > MAX_WAIT_TIME {
            return Err(Error::InvalidWaitTime);
        }
        // A zero window expires every receipt before it can be acknowledged.
        if self.receive.visibility_timeout.is_zero() {
            return Err(Error::InvalidVisibilityTimeout);
        }
        if self.receive_timeout.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidReceiveTimeout);
        }
        if self.skip_send && self.skip_receive {
            return Err(Error::NothingToRun);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RunConfig::new(100, 10, 10, "q");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.receive.max_batch, 10);
        assert_eq!(cfg.remainder, RemainderPolicy::Spread);
    }

    #[test]
    fn rejects_zero_counts_and_empty_queue() {
        assert!(matches!(
            RunConfig::new(0, 1, 1, "q").validate(),
            Err(Error::InvalidTotal)
        ));
        assert!(matches!(
            RunConfig::new(1, 0, 1, "q").validate(),
            Err(Error::InvalidProducers)
        ));
        assert!(matches!(
            RunConfig::new(1, 1, 0, "q").validate(),
            Err(Error::InvalidConsumers)
        ));
        assert!(matches!(
            RunConfig::new(1, 1, 1, "  ").validate(),
            Err(Error::InvalidQueueName)
        ));
    }

    #[test]
    fn rejects_batch_size_above_queue_limit() {
        let mut cfg = RunConfig::new(1, 1, 1, "q");
        cfg.receive.max_batch = 11;
        assert!(matches!(cfg.validate(), Err(Error::InvalidBatchSize)));
        cfg.receive.max_batch = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidBatchSize)));
    }

    #[test]
    fn rejects_wait_time_above_queue_limit() {
        let mut cfg = RunConfig::new(1, 1, 1, "q");
        cfg.receive.wait_time = Duration::from_secs(30);
        assert!(matches!(cfg.validate(), Err(Error::InvalidWaitTime)));

        cfg.receive.wait_time = Duration::from_millis(20_001);
        assert!(matches!(cfg.validate(), Err(Error::InvalidWaitTime)));

        cfg.receive.wait_time = MAX_WAIT_TIME;
        assert!(cfg.validate().is_ok());
        cfg.receive.wait_time = Duration::ZERO;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_visibility_timeout() {
        let mut cfg = RunConfig::new(1, 1, 1, "q");
        cfg.receive.visibility_timeout = Duration::ZERO;
        let err = cfg.validate().err();
        assert!(matches!(err, Some(Error::InvalidVisibilityTimeout)));
        assert!(err.is_some_and(|e| e.is_invalid_config()));

        cfg.receive.visibility_timeout = Duration::from_millis(500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_both_phases_skipped() {
        let mut cfg = RunConfig::new(1, 1, 1, "q");
        cfg.skip_send = true;
        cfg.skip_receive = true;
        assert!(matches!(cfg.validate(), Err(Error::NothingToRun)));
    }

    #[test]
    fn remainder_policy_parses_kebab_case() {
        assert_eq!("spread".parse::<RemainderPolicy>().ok(), Some(RemainderPolicy::Spread));
        assert_eq!("drop".parse::<RemainderPolicy>().ok(), Some(RemainderPolicy::Drop));
        assert!("round-robin".parse::<RemainderPolicy>().is_err());
        assert_eq!(RemainderPolicy::Drop.to_string(), "drop");
    }
}
