//! Generation request queue with cancellation support.
//!
//! Routes submit `GenerationRequest`s to a bounded MPSC channel.
//! A single worker task processes them sequentially via `spawn_blocking`,
//! so only one turn touches the model at a time. Each turn's updates flow
//! back over the request's own bounded channel; a full channel pauses
//! generation until the client catches up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use hard_chat_engine::{ChatError, ChatTurnController, ConversationHistory, GenerationConfig};

/// Flag that the worker checks between fragments to abort generation early.
pub type CancellationFlag = Arc<AtomicBool>;

/// Updates buffered per turn before generation waits on the client.
pub const EVENT_BUFFER: usize = 32;

/// What a turn reports back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Prior history plus the in-progress turn.
    Update(ConversationHistory),
    /// Generation failed; no further events follow.
    Error(ChatError),
}

/// Everything needed to run one turn.
pub struct GenerationRequest {
    pub id: Uuid,
    pub message: String,
    /// Turns before this one. Published updates are `history + [current]`.
    pub history: ConversationHistory,
    pub system_prompt: String,
    pub config: GenerationConfig,
    /// Caller sets this to `true` to request early stop.
    pub cancel: CancellationFlag,
    pub events: mpsc::Sender<TurnEvent>,
}

impl GenerationRequest {
    /// Build a request and the receiver its updates arrive on.
    pub fn new(
        message: String,
        history: ConversationHistory,
        system_prompt: String,
        config: GenerationConfig,
    ) -> (Self, mpsc::Receiver<TurnEvent>) {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let request = Self {
            id: Uuid::new_v4(),
            message,
            history,
            system_prompt,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            events,
        };
        (request, rx)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Too many pending requests, try again later")]
    Full,
    #[error("Generation queue closed")]
    Closed,
}

/// Cloneable handle that route handlers use to submit generation work.
#[derive(Clone)]
pub struct GenerationQueue {
    tx: mpsc::Sender<GenerationRequest>,
    /// The cancellation flag of the currently in-progress generation (if any).
    active_cancel: Arc<Mutex<Option<CancellationFlag>>>,
}

/// How a turn ended, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { updates: u32 },
    Failed { updates: u32 },
    Abandoned { updates: u32 },
}

impl GenerationQueue {
    /// Create the queue and spawn the background worker.
    pub fn spawn(controller: ChatTurnController, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<GenerationRequest>(capacity);
        let active_cancel: Arc<Mutex<Option<CancellationFlag>>> = Arc::new(Mutex::new(None));

        tokio::spawn(generation_worker(controller, rx, active_cancel.clone()));

        Self { tx, active_cancel }
    }

    /// Enqueue without waiting; a full queue is rejected.
    pub fn try_submit(&self, request: GenerationRequest) -> Result<(), QueueError> {
        let id = request.id;
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                log::warn!("[{id}] Queue full, rejecting turn");
                QueueError::Full
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        log::info!("[{id}] Turn queued");
        Ok(())
    }

    /// Submit a request, waiting for room in the queue.
    pub async fn submit(&self, request: GenerationRequest) -> Result<(), QueueError> {
        self.tx.send(request).await.map_err(|_| QueueError::Closed)
    }

    /// Cancel the currently in-progress generation (if any).
    pub fn cancel_active(&self) {
        if let Ok(guard) = self.active_cancel.lock() {
            if let Some(ref flag) = *guard {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Long-lived task that pulls requests off the channel one at a time.
async fn generation_worker(
    controller: ChatTurnController,
    mut rx: mpsc::Receiver<GenerationRequest>,
    active_cancel: Arc<Mutex<Option<CancellationFlag>>>,
) {
    while let Some(req) = rx.recv().await {
        let id = req.id;
        // Skip requests whose caller already went away.
        if req.cancel.load(Ordering::SeqCst) || req.events.is_closed() {
            log::info!("[{id}] Cancelled before starting");
            continue;
        }

        // Publish this request's flag so cancel_active() can reach it.
        if let Ok(mut guard) = active_cancel.lock() {
            *guard = Some(req.cancel.clone());
        }

        let controller = controller.clone();
        let join_result = tokio::task::spawn_blocking(move || run_turn(&controller, req)).await;

        if let Ok(mut guard) = active_cancel.lock() {
            *guard = None;
        }

        match join_result {
            Ok(TurnOutcome::Completed { updates }) => {
                log::info!("[{id}] Turn completed after {updates} updates");
            }
            Ok(TurnOutcome::Failed { updates }) => {
                log::warn!("[{id}] Turn failed after {updates} updates");
            }
            Ok(TurnOutcome::Abandoned { updates }) => {
                log::info!("[{id}] Client went away after {updates} updates, generation stopped");
            }
            Err(e) => log::error!("[{id}] Generation task panicked: {e}"),
        }
    }
}

/// Drive one turn to completion on the current (blocking) thread.
pub fn run_turn(controller: &ChatTurnController, req: GenerationRequest) -> TurnOutcome {
    let GenerationRequest {
        id,
        message,
        history,
        system_prompt,
        config,
        cancel,
        events,
    } = req;

    log::info!(
        "[{id}] Generating (max_new_tokens={}, history={} turns)",
        config.max_new_tokens,
        history.len()
    );
    let stream = match controller.run(&message, &history, &system_prompt, &config) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("[{id}] Generation could not start: {e}");
            let _ = events.blocking_send(TurnEvent::Error(e));
            return TurnOutcome::Failed { updates: 0 };
        }
    };

    let mut updates = 0;
    for item in stream {
        if cancel.load(Ordering::SeqCst) {
            return TurnOutcome::Abandoned { updates };
        }
        let event = match item {
            Ok(turn) => TurnEvent::Update(history.with_turn(turn)),
            Err(e) => {
                log::error!("[{id}] Generation failed mid-stream: {e}");
                let _ = events.blocking_send(TurnEvent::Error(e));
                return TurnOutcome::Failed { updates };
            }
        };
        // Dropping the stream on disconnect stops sampling.
        if events.blocking_send(event).is_err() {
            return TurnOutcome::Abandoned { updates };
        }
        updates += 1;
    }
    TurnOutcome::Completed { updates }
}
