//! Execution-context bridge: runs the size-targeting encoder off the
//! caller's thread, relaying progress and enforcing a hard timeout. The
//! context strategy (worker thread vs inline fallback) is chosen once per
//! operation.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::encode::{
    AnimationEncoder, CancelFlag, EncodeOutcome, EncodeRequest, PROGRESS_ENCODE_END,
    PROGRESS_ENCODE_START, encode_with_budget,
};
use crate::error::{MabatakiError, MabatakiResult};

/// Wall-clock budget for one encode operation in worker mode. On expiry the
/// worker is abandoned and its in-flight state discarded.
pub const ENCODE_TIMEOUT: Duration = Duration::from_secs(180);

/// Request message. Serde shape is the stable wire contract:
/// `{"type": "encode", "buffers": [...], ...}`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Encode(EncodeRequest),
}

/// Event messages flowing back from the worker: zero or more `progress`
/// entries followed by exactly one terminal `complete` or `error`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Progress {
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Complete(EncodeOutcome),
    Error {
        message: String,
    },
}

/// One encode operation: request in, best result out, progress callbacks on
/// the caller's thread along the way.
pub trait EncodeContext {
    fn encode(
        &self,
        request: EncodeRequest,
        on_progress: &mut dyn FnMut(f64, Option<&str>),
    ) -> MabatakiResult<EncodeOutcome>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Worker,
    Inline,
}

impl ContextKind {
    /// Capability check, made once per operation: worker mode needs the host
    /// to permit spawning threads, inline is always available.
    pub fn detect() -> Self {
        match thread::Builder::new()
            .name("mabataki-probe".into())
            .spawn(|| {})
        {
            Ok(handle) => {
                let _ = handle.join();
                ContextKind::Worker
            }
            Err(_) => ContextKind::Inline,
        }
    }
}

pub fn create_context(
    kind: ContextKind,
    encoder: Arc<dyn AnimationEncoder>,
) -> Box<dyn EncodeContext> {
    match kind {
        ContextKind::Worker => Box::new(WorkerContext::new(encoder)),
        ContextKind::Inline => Box::new(InlineContext::new(encoder)),
    }
}

/// Runs the encode loop on a dedicated worker thread. The request's pixel
/// buffers move into the thread; events come back over a channel.
pub struct WorkerContext {
    encoder: Arc<dyn AnimationEncoder>,
    timeout: Duration,
}

impl WorkerContext {
    pub fn new(encoder: Arc<dyn AnimationEncoder>) -> Self {
        Self {
            encoder,
            timeout: ENCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(encoder: Arc<dyn AnimationEncoder>, timeout: Duration) -> Self {
        Self { encoder, timeout }
    }
}

impl EncodeContext for WorkerContext {
    fn encode(
        &self,
        request: EncodeRequest,
        on_progress: &mut dyn FnMut(f64, Option<&str>),
    ) -> MabatakiResult<EncodeOutcome> {
        let (tx, rx): (Sender<WorkerMessage>, Receiver<WorkerMessage>) = unbounded();
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let encoder = Arc::clone(&self.encoder);

        let handle = thread::Builder::new()
            .name("mabataki-encode".into())
            .spawn(move || run_worker(encoder.as_ref(), request, &worker_cancel, &tx))
            .map_err(|e| MabatakiError::bridge(format!("failed to spawn encode worker: {e}")))?;

        let deadline = Instant::now() + self.timeout;
        let mut last_value = f64::MIN;
        loop {
            match rx.recv_deadline(deadline) {
                Ok(WorkerMessage::Progress { value, message }) => {
                    // Progress must reach the caller in non-decreasing order;
                    // drop regressions.
                    if value >= last_value {
                        last_value = value;
                        on_progress(value, message.as_deref());
                    }
                }
                Ok(WorkerMessage::Complete(outcome)) => {
                    let _ = handle.join();
                    return Ok(outcome);
                }
                Ok(WorkerMessage::Error { message }) => {
                    let _ = handle.join();
                    return Err(MabatakiError::encode(message));
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Abandon the worker: the cancel flag makes it bail
                    // between trials, and its remaining sends go nowhere.
                    cancel.cancel();
                    drop(rx);
                    tracing::warn!(
                        timeout_secs = self.timeout.as_secs(),
                        "encode worker timed out"
                    );
                    return Err(MabatakiError::timeout(format!(
                        "encoding did not finish within {}s; reduce the image size or frame count",
                        self.timeout.as_secs()
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = handle.join();
                    return Err(MabatakiError::bridge(
                        "encode worker terminated without a result",
                    ));
                }
            }
        }
    }
}

fn run_worker(
    encoder: &dyn AnimationEncoder,
    request: EncodeRequest,
    cancel: &CancelFlag,
    tx: &Sender<WorkerMessage>,
) {
    let mut forward = |value: f64, message: Option<&str>| {
        let _ = tx.send(WorkerMessage::Progress {
            value,
            message: message.map(str::to_owned),
        });
    };

    let terminal = match encode_with_budget(encoder, &request, cancel, &mut forward) {
        Ok(outcome) => WorkerMessage::Complete(outcome),
        Err(err) => WorkerMessage::Error {
            message: err.to_string(),
        },
    };
    if tx.send(terminal).is_err() {
        // Caller already gone (timeout teardown); the result is discarded.
        tracing::warn!("encode result dropped, caller no longer listening");
    }
}

/// Fallback for hosts without worker capability: the same encode loop on the
/// caller's thread, with progress limited to the window edges.
pub struct InlineContext {
    encoder: Arc<dyn AnimationEncoder>,
}

impl InlineContext {
    pub fn new(encoder: Arc<dyn AnimationEncoder>) -> Self {
        Self { encoder }
    }
}

impl EncodeContext for InlineContext {
    fn encode(
        &self,
        request: EncodeRequest,
        on_progress: &mut dyn FnMut(f64, Option<&str>),
    ) -> MabatakiResult<EncodeOutcome> {
        on_progress(PROGRESS_ENCODE_START, Some("encoding"));
        let cancel = CancelFlag::new();
        let outcome =
            encode_with_budget(self.encoder.as_ref(), &request, &cancel, &mut |_, _| {})?;
        on_progress(PROGRESS_ENCODE_END, None);
        Ok(outcome)
    }
}
