use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QueueErrorKind {
    NotFound,
    Transient,
    Permanent,
    Transport,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Unknown queue, or a receipt that already expired or was removed.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient queue error: {0}")]
    Transient(String),

    #[error("queue rejected the request: {0}")]
    Permanent(String),

    #[error("queue transport error: {0}")]
    Transport(String),

    #[error("queue request timed out after {0:?}")]
    Timeout(Duration),
}

impl QueueError {
    #[must_use]
    pub fn kind(&self) -> QueueErrorKind {
        match self {
            Self::NotFound(_) => QueueErrorKind::NotFound,
            Self::Transient(_) => QueueErrorKind::Transient,
            Self::Permanent(_) => QueueErrorKind::Permanent,
            Self::Transport(_) => QueueErrorKind::Transport,
            Self::Timeout(_) => QueueErrorKind::Timeout,
        }
    }

    /// Whether a retry could plausibly succeed. The drill itself never retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Transport(_) | Self::Timeout(_)
        )
    }
}
