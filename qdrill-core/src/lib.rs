#![forbid(unsafe_code)]

mod config;
mod error;
mod message;

pub mod queue;
pub mod runner;

pub use config::{MAX_BATCH_SIZE, MAX_WAIT_TIME, ReceiveOptions, RemainderPolicy, RunConfig};
pub use error::{Error, Result};
pub use message::{ATTR_SEQUENCE, ATTR_WORKER, AttributeValue, Message, MessageTemplate};
pub use queue::{
    MemoryQueue, QueueClient, QueueError, QueueErrorKind, QueueHandle, ReceiptToken,
    ReceivedMessage, SendReceipt, SqsClient,
};
