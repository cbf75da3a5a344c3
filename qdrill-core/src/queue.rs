use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::ReceiveOptions;
use crate::message::Message;

mod error;
pub mod memory;
pub mod sqs;

pub use error::{QueueError, QueueErrorKind};
pub use memory::MemoryQueue;
pub use sqs::SqsClient;

/// Addressable queue reference returned by [`QueueClient::resolve_queue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle(Arc<str>);

impl QueueHandle {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle needed to acknowledge a received message. Only valid while the message is
/// still invisible to other consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptToken(Arc<str>);

impl ReceiptToken {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: Bytes,
    pub receipt: ReceiptToken,
}

/// The queue service as seen by the drill. Implementations must be safe to share across
/// every producer and consumer task.
pub trait QueueClient: Send + Sync + 'static {
    fn resolve_queue(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<QueueHandle, QueueError>> + Send;

    fn send(
        &self,
        queue: &QueueHandle,
        message: &Message,
    ) -> impl Future<Output = Result<SendReceipt, QueueError>> + Send;

    /// May return an empty batch once `opts.wait_time` elapses.
    fn receive(
        &self,
        queue: &QueueHandle,
        opts: &ReceiveOptions,
    ) -> impl Future<Output = Result<Vec<ReceivedMessage>, QueueError>> + Send;

    fn acknowledge(
        &self,
        queue: &QueueHandle,
        receipt: &ReceiptToken,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}
