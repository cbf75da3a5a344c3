//! Local queue server speaking the SQS JSON subset the drill uses, backed by
//! [`MemoryQueue`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use qdrill_core::queue::sqs::wire;
use qdrill_core::{
    MAX_BATCH_SIZE, MemoryQueue, Message, QueueClient, QueueError, QueueHandle, ReceiptToken,
    ReceiveOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Account segment used in every queue URL the server hands out.
pub const ACCOUNT_ID: &str = "000000000000";

/// Managed queues cap a single long-poll at 20 seconds.
const MAX_WAIT_SECONDS: u64 = 20;

#[derive(Debug, Clone, Default)]
pub struct TestQueueStats {
    requests_total: Arc<AtomicU64>,
    sends: Arc<AtomicU64>,
    receives: Arc<AtomicU64>,
    deletes: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl TestQueueStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::Relaxed)
    }

    pub fn receives(&self) -> u64 {
        self.receives.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Requests answered with a 4xx/5xx.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct AppState {
    queue: Arc<MemoryQueue>,
    base_url: Arc<str>,
    stats: TestQueueStats,
}

struct Failure {
    status: StatusCode,
    body: wire::ErrorResponse,
}

impl Failure {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: wire::ErrorResponse::new(code, message),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, wire::ERR_INVALID_PARAMETER, message)
    }

    /// Maps a queue error onto the error code a managed queue would answer `operation` with.
    fn from_queue(operation: &str, err: QueueError) -> Self {
        match err {
            QueueError::NotFound(msg) if operation == wire::OP_DELETE_MESSAGE => {
                Self::new(StatusCode::BAD_REQUEST, wire::ERR_RECEIPT_HANDLE_INVALID, msg)
            }
            QueueError::NotFound(msg) => {
                Self::new(StatusCode::BAD_REQUEST, wire::ERR_QUEUE_DOES_NOT_EXIST, msg)
            }
            QueueError::Permanent(msg) => Self::bad_request(msg),
            other => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ServiceUnavailable",
                other.to_string(),
            ),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        json_response(self.status, &self.body)
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, wire::CONTENT_TYPE)], body).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode error").into_response(),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Failure> {
    serde_json::from_slice(body).map_err(|e| Failure::bad_request(format!("malformed request: {e}")))
}

/// The queue name is the last path segment of a queue URL.
fn queue_name(queue_url: &str) -> &str {
    queue_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(queue_url)
}

async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    TestQueueStats::inc(&state.stats.requests_total);

    let operation = headers
        .get(wire::TARGET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(wire::TARGET_PREFIX))
        .unwrap_or_default()
        .to_string();

    match dispatch(&state, &operation, &body).await {
        Ok(res) => res,
        Err(failure) => {
            TestQueueStats::inc(&state.stats.errors);
            tracing::debug!(
                operation = %operation,
                status = failure.status.as_u16(),
                code = failure.body.code(),
                "request failed"
            );
            failure.into_response()
        }
    }
}

async fn dispatch(state: &AppState, operation: &str, body: &[u8]) -> Result<Response, Failure> {
    match operation {
        wire::OP_GET_QUEUE_URL => {
            let req: wire::GetQueueUrlRequest = decode(body)?;
            state
                .queue
                .resolve_queue(&req.queue_name)
                .await
                .map_err(|e| Failure::from_queue(operation, e))?;
            Ok(json_response(
                StatusCode::OK,
                &wire::GetQueueUrlResponse {
                    queue_url: queue_url(&state.base_url, &req.queue_name),
                },
            ))
        }
        wire::OP_SEND_MESSAGE => {
            TestQueueStats::inc(&state.stats.sends);
            let req: wire::SendMessageRequest = decode(body)?;
            let mut message = Message::new(req.message_body);
            message.attributes = req
                .message_attributes
                .iter()
                .filter_map(|(name, v)| v.to_attribute().map(|a| (name.clone(), a)))
                .collect();

            let handle = QueueHandle::new(queue_name(&req.queue_url));
            let receipt = state
                .queue
                .send(&handle, &message)
                .await
                .map_err(|e| Failure::from_queue(operation, e))?;
            Ok(json_response(
                StatusCode::OK,
                &wire::SendMessageResponse {
                    message_id: receipt.message_id,
                },
            ))
        }
        wire::OP_RECEIVE_MESSAGE => {
            TestQueueStats::inc(&state.stats.receives);
            let req: wire::ReceiveMessageRequest = decode(body)?;
            if req.max_number_of_messages == 0 || req.max_number_of_messages > MAX_BATCH_SIZE {
                return Err(Failure::bad_request(format!(
                    "MaxNumberOfMessages must be between 1 and {MAX_BATCH_SIZE}"
                )));
            }
            if req.wait_time_seconds > MAX_WAIT_SECONDS {
                return Err(Failure::bad_request(format!(
                    "WaitTimeSeconds must be at most {MAX_WAIT_SECONDS}"
                )));
            }

            let opts = ReceiveOptions {
                max_batch: req.max_number_of_messages,
                wait_time: Duration::from_secs(req.wait_time_seconds),
                visibility_timeout: Duration::from_secs(req.visibility_timeout),
            };
            let handle = QueueHandle::new(queue_name(&req.queue_url));
            let batch = state
                .queue
                .receive(&handle, &opts)
                .await
                .map_err(|e| Failure::from_queue(operation, e))?;

            let messages = batch
                .into_iter()
                .map(|m| wire::WireMessage {
                    message_id: m.message_id,
                    receipt_handle: m.receipt.as_str().to_string(),
                    body: String::from_utf8_lossy(&m.body).into_owned(),
                })
                .collect();
            Ok(json_response(
                StatusCode::OK,
                &wire::ReceiveMessageResponse { messages },
            ))
        }
        wire::OP_DELETE_MESSAGE => {
            TestQueueStats::inc(&state.stats.deletes);
            let req: wire::DeleteMessageRequest = decode(body)?;
            let handle = QueueHandle::new(queue_name(&req.queue_url));
            state
                .queue
                .acknowledge(&handle, &ReceiptToken::new(req.receipt_handle))
                .await
                .map_err(|e| Failure::from_queue(operation, e))?;
            Ok(json_response(StatusCode::OK, &serde_json::json!({})))
        }
        other => Err(Failure::new(
            StatusCode::BAD_REQUEST,
            wire::ERR_UNKNOWN_OPERATION,
            format!("unsupported operation `{other}`"),
        )),
    }
}

#[must_use]
pub fn queue_url(base_url: &str, name: &str) -> String {
    format!("{base_url}/{ACCOUNT_ID}/{name}")
}

pub fn router(queue: Arc<MemoryQueue>, base_url: &str, stats: TestQueueStats) -> Router {
    Router::new()
        .route("/", post(handle))
        .with_state(AppState {
            queue,
            base_url: Arc::from(base_url),
            stats,
        })
}

pub struct TestQueue {
    addr: SocketAddr,
    base_url: String,
    queue: Arc<MemoryQueue>,
    stats: TestQueueStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestQueue {
    /// Starts a server on an ephemeral port with the given queues created.
    pub async fn start(queues: &[&str]) -> std::io::Result<Self> {
        let queue = MemoryQueue::new();
        for name in queues {
            queue.create_queue(*name);
        }
        Self::start_with(queue).await
    }

    /// Starts a server over a prepared queue, e.g. one with fault hooks installed.
    pub async fn start_with(queue: MemoryQueue) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Self::serve(listener, Arc::new(queue))
    }

    /// Serves on an already bound listener until [`TestQueue::shutdown`] or drop.
    pub fn serve(listener: TcpListener, queue: Arc<MemoryQueue>) -> std::io::Result<Self> {
        let addr = listener.local_addr()?;
        let base_url = format!("http://{addr}");
        let stats = TestQueueStats::default();

        let app = router(queue.clone(), &base_url, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url,
            queue,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn queue_url(&self, name: &str) -> String {
        queue_url(&self.base_url, name)
    }

    pub fn queue(&self) -> &Arc<MemoryQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &TestQueueStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestQueue {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
