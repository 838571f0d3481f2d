//! Operation log parser
//!
//! Decoding runs on a dedicated worker thread so replaying thousands of lines never
//! stalls the async runtime. Calls and worker responses are correlated by request id
//! through a pending map; a router task resolves the waiting caller when its response
//! arrives. The worker is stateless across requests.

use super::codec::{decode_line, sanitize_line};
use super::Operation;
use crate::error::{ParserError, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default deadline for one decode round trip
pub const DEFAULT_PARSE_TIMEOUT_MS: u64 = 10_000;

const REQUEST_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub(crate) struct ParseRequest {
    pub request_id: u64,
    pub origin_id: String,
    pub lines: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct ParseResponse {
    pub request_id: u64,
    pub operations: Vec<Operation>,
}

type Waiter = oneshot::Sender<Result<Vec<Operation>, ParserError>>;
type PendingMap = Arc<Mutex<HashMap<u64, Waiter>>>;

/// Decodes JSONL operation lines off the caller's task.
///
/// Must be created inside a Tokio runtime (the response router is a spawned task).
pub struct OpsParser {
    requests: Mutex<Option<mpsc::Sender<ParseRequest>>>,
    pending: PendingMap,
    next_request_id: AtomicU64,
    destroyed: AtomicBool,
    router: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl OpsParser {
    /// Start a parser with its own worker thread.
    pub fn spawn(timeout: Duration) -> Result<Self, StorageError> {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("ops-parser".to_string())
            .spawn(move || worker_loop(request_rx, response_tx))?;

        Ok(Self::from_channels(request_tx, response_rx, timeout))
    }

    /// Start a parser with the default 10s deadline.
    pub fn with_default_timeout() -> Result<Self, StorageError> {
        Self::spawn(Duration::from_millis(DEFAULT_PARSE_TIMEOUT_MS))
    }

    /// Wire a parser to an arbitrary worker speaking the request/response protocol.
    pub(crate) fn from_channels(
        requests: mpsc::Sender<ParseRequest>,
        mut responses: mpsc::UnboundedReceiver<ParseResponse>,
        timeout: Duration,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let router_pending = Arc::clone(&pending);
        let router = tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                let waiter = router_pending.lock().remove(&response.request_id);
                match waiter {
                    Some(waiter) => {
                        // The caller may have given up between eviction checks; nothing to do then.
                        let _ = waiter.send(Ok(response.operations));
                    }
                    None => {
                        debug!(
                            request_id = response.request_id,
                            "Dropping response for unknown or expired parse request"
                        );
                    }
                }
            }
            debug!("Ops parser router stopped");
        });

        Self {
            requests: Mutex::new(Some(requests)),
            pending,
            next_request_id: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
            router: Mutex::new(Some(router)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Parse lines with this parser's configured deadline.
    pub async fn parse_lines(
        &self,
        lines: Vec<String>,
        origin_id: &str,
    ) -> Result<Vec<Operation>, ParserError> {
        self.parse_lines_with_timeout(lines, origin_id, self.timeout)
            .await
    }

    /// Parse lines into operations stamped with `origin_id`, preserving input order.
    ///
    /// Malformed lines are logged and skipped; only the round trip itself can fail.
    pub async fn parse_lines_with_timeout(
        &self,
        lines: Vec<String>,
        origin_id: &str,
        timeout: Duration,
    ) -> Result<Vec<Operation>, ParserError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(ParserError::Destroyed);
        }
        let sender = self
            .requests
            .lock()
            .clone()
            .ok_or(ParserError::Destroyed)?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (waiter, response) = oneshot::channel();
        {
            // Checked under the lock `shutdown` drains with, so a waiter is never
            // registered after the drain.
            let mut pending = self.pending.lock();
            if self.destroyed.load(Ordering::Acquire) {
                return Err(ParserError::Destroyed);
            }
            pending.insert(request_id, waiter);
        }

        let line_count = lines.len();
        let request = ParseRequest {
            request_id,
            origin_id: origin_id.to_string(),
            lines,
        };

        let round_trip = async {
            if sender.send(request).await.is_err() {
                return Err(self.closed_error());
            }
            match response.await {
                Ok(result) => result,
                Err(_) => Err(self.closed_error()),
            }
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(result) => {
                if result.is_err() {
                    self.pending.lock().remove(&request_id);
                }
                result
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    request_id,
                    origin_id,
                    line_count,
                    timeout_ms,
                    "Operation parsing timed out"
                );
                Err(ParserError::TimedOut { timeout_ms })
            }
        }
    }

    /// Number of requests still waiting for the worker
    pub fn pending_request_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Stop the worker and reject every outstanding request with `Destroyed`.
    ///
    /// Later calls fail immediately.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown();
        info!("Ops parser destroyed");
    }

    fn shutdown(&self) {
        self.requests.lock().take();
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
        let outstanding: Vec<Waiter> = self.pending.lock().drain().map(|(_, w)| w).collect();
        for waiter in outstanding {
            let _ = waiter.send(Err(ParserError::Destroyed));
        }
    }

    fn closed_error(&self) -> ParserError {
        if self.destroyed.load(Ordering::Acquire) {
            ParserError::Destroyed
        } else {
            ParserError::WorkerGone
        }
    }
}

impl Drop for OpsParser {
    fn drop(&mut self) {
        self.destroyed.store(true, Ordering::Release);
        self.shutdown();
    }
}

fn worker_loop(
    mut requests: mpsc::Receiver<ParseRequest>,
    responses: mpsc::UnboundedSender<ParseResponse>,
) {
    while let Some(request) = requests.blocking_recv() {
        let operations = decode_batch(&request.lines, &request.origin_id);
        let response = ParseResponse {
            request_id: request.request_id,
            operations,
        };
        if responses.send(response).is_err() {
            break;
        }
    }
    debug!("Ops parser worker stopped");
}

/// Decode a batch of raw lines synchronously, skipping (and logging) bad ones.
pub fn decode_batch(lines: &[String], origin_id: &str) -> Vec<Operation> {
    let mut operations = Vec::with_capacity(lines.len());
    for (index, raw) in lines.iter().enumerate() {
        let line = sanitize_line(raw);
        if line.is_empty() {
            continue;
        }
        match decode_line(&line, origin_id) {
            Ok(op) => operations.push(op),
            Err(e) => {
                warn!(
                    origin_id,
                    line_number = index + 1,
                    error = %e,
                    "Skipping malformed operation line"
                );
            }
        }
    }
    operations
}
