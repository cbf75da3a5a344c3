//! Client for the SQS JSON protocol (`X-Amz-Target: AmazonSQS.<Operation>`).
//!
//! Requests are not SigV4-signed; this targets local emulators and the bundled test queue.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};

use super::{QueueClient, QueueError, QueueHandle, ReceiptToken, ReceivedMessage, SendReceipt};
use crate::config::ReceiveOptions;
use crate::message::Message;

pub mod wire;

/// Informational header; lets emulators that route by region see the configured one.
pub const REGION_HEADER: &str = "x-qdrill-region";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time a receive call gets on top of its long-poll wait.
const RECEIVE_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SqsClient {
    inner: Client<HttpConnector, Full<Bytes>>,
    endpoint: hyper::Uri,
    host: String,
    region: Arc<str>,
    request_timeout: Duration,
}

impl SqsClient {
    pub fn new(endpoint: &str, region: &str) -> Result<Self, QueueError> {
        let parsed = url::Url::parse(endpoint)
            .map_err(|_| QueueError::Permanent(format!("invalid endpoint url: {endpoint}")))?;
        if parsed.scheme() != "http" {
            return Err(QueueError::Permanent(format!(
                "only http:// endpoints are supported for now: {endpoint}"
            )));
        }

        let host = host_header_value(&parsed)
            .ok_or_else(|| QueueError::Permanent(format!("endpoint has no host: {endpoint}")))?;
        let uri: hyper::Uri = parsed
            .as_str()
            .parse()
            .map_err(|_| QueueError::Permanent(format!("invalid endpoint url: {endpoint}")))?;

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        Ok(Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
            endpoint: uri,
            host,
            region: Arc::from(region),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Timeout for send/resolve/acknowledge calls. Receive calls use the long-poll wait plus
    /// a fixed slack instead.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn call<Req, Res>(
        &self,
        operation: &str,
        req: &Req,
        timeout: Duration,
    ) -> Result<Res, QueueError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(req).map_err(|e| {
            QueueError::Permanent(format!("failed to encode {operation} request: {e}"))
        })?;

        let request = Request::builder()
            .method(http::Method::POST)
            .uri(self.endpoint.clone())
            .header(http::header::HOST, self.host.as_str())
            .header(http::header::CONTENT_TYPE, wire::CONTENT_TYPE)
            .header(http::header::CONTENT_LENGTH, body.len())
            .header(
                wire::TARGET_HEADER,
                format!("{}{operation}", wire::TARGET_PREFIX),
            )
            .header(REGION_HEADER, self.region.as_ref())
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| QueueError::Transport(format!("failed to build request: {e}")))?;

        let res: hyper::Response<Incoming> =
            match tokio::time::timeout(timeout, self.inner.request(request)).await {
                Ok(res) => res.map_err(|e| QueueError::Transport(e.to_string()))?,
                Err(_) => return Err(QueueError::Timeout(timeout)),
            };

        let (parts, body) = res.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| QueueError::Transport(format!("failed to read response body: {e}")))?
            .to_bytes();

        if !parts.status.is_success() {
            return Err(classify_error(parts.status.as_u16(), &body));
        }

        // Some emulators answer DeleteMessage with an empty body.
        let body = if body.is_empty() {
            Bytes::from_static(b"{}")
        } else {
            body
        };

        serde_json::from_slice(&body).map_err(|e| {
            QueueError::Permanent(format!("malformed {operation} response: {e}"))
        })
    }
}

impl QueueClient for SqsClient {
    async fn resolve_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
        let req = wire::GetQueueUrlRequest {
            queue_name: name.to_string(),
        };
        let res: wire::GetQueueUrlResponse = self
            .call(wire::OP_GET_QUEUE_URL, &req, self.request_timeout)
            .await?;
        Ok(QueueHandle::new(res.queue_url))
    }

    async fn send(&self, queue: &QueueHandle, message: &Message) -> Result<SendReceipt, QueueError> {
        let message_body = std::str::from_utf8(&message.body)
            .map_err(|_| QueueError::Permanent("message body must be valid UTF-8".to_string()))?
            .to_string();

        let req = wire::SendMessageRequest {
            queue_url: queue.as_str().to_string(),
            message_body,
            delay_seconds: 0,
            message_attributes: message
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), wire::MessageAttributeValue::from(v)))
                .collect(),
        };

        let res: wire::SendMessageResponse = self
            .call(wire::OP_SEND_MESSAGE, &req, self.request_timeout)
            .await?;
        Ok(SendReceipt {
            message_id: res.message_id,
        })
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        opts: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let req = wire::ReceiveMessageRequest {
            queue_url: queue.as_str().to_string(),
            max_number_of_messages: opts.max_batch,
            visibility_timeout: whole_secs_ceil(opts.visibility_timeout),
            wait_time_seconds: whole_secs_ceil(opts.wait_time),
        };

        let timeout = opts.wait_time.saturating_add(RECEIVE_TIMEOUT_SLACK);
        let res: wire::ReceiveMessageResponse = self
            .call(wire::OP_RECEIVE_MESSAGE, &req, timeout)
            .await?;

        Ok(res
            .messages
            .into_iter()
            .map(|m| ReceivedMessage {
                message_id: m.message_id,
                body: Bytes::from(m.body),
                receipt: ReceiptToken::new(m.receipt_handle),
            })
            .collect())
    }

    async fn acknowledge(
        &self,
        queue: &QueueHandle,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let req = wire::DeleteMessageRequest {
            queue_url: queue.as_str().to_string(),
            receipt_handle: receipt.as_str().to_string(),
        };
        let _: IgnoredAny = self
            .call(wire::OP_DELETE_MESSAGE, &req, self.request_timeout)
            .await?;
        Ok(())
    }
}

/// The wire carries whole seconds; round up so a sub-second window never becomes zero.
fn whole_secs_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) if port != 80 => Some(format!("{host}:{port}")),
        _ => Some(host.to_string()),
    }
}

pub(crate) fn classify_error(status: u16, body: &[u8]) -> QueueError {
    let parsed: Option<wire::ErrorResponse> = serde_json::from_slice(body).ok();
    let (code, detail) = match &parsed {
        Some(err) => (err.code(), format!("{}: {}", err.code(), err.message)),
        None => ("", format!("http {status}: {}", String::from_utf8_lossy(body))),
    };

    match code {
        wire::ERR_QUEUE_DOES_NOT_EXIST
        | wire::ERR_NON_EXISTENT_QUEUE
        | wire::ERR_RECEIPT_HANDLE_INVALID => QueueError::NotFound(detail),
        wire::ERR_THROTTLING => QueueError::Transient(detail),
        _ if status >= 500 || status == 429 => QueueError::Transient(detail),
        _ => QueueError::Permanent(detail),
    }
}
