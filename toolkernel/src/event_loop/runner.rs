//! The event loop.

use super::event::{Event, Turn, TurnEvent};
use super::generator::{ContentGenerator, NoOpContentGenerator};
use crate::config::EventLoopConfig;
use crate::tools::{ExecutionManager, ToolCallOutcome, ToolResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Async handler for one event type.
pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Counters for loop activity.
#[derive(Debug, Default)]
pub struct EventLoopStats {
    events_processed: AtomicU64,
    turns_processed: AtomicU64,
    handler_failures: AtomicU64,
    unhandled_events: AtomicU64,
}

impl EventLoopStats {
    /// Returns the number of events taken off the queue.
    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    /// Returns the number of turns taken off the queue.
    #[must_use]
    pub fn turns_processed(&self) -> u64 {
        self.turns_processed.load(Ordering::Relaxed)
    }

    /// Returns the number of handlers that failed or panicked.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of events with no registered handler.
    #[must_use]
    pub fn unhandled_events(&self) -> u64 {
        self.unhandled_events.load(Ordering::Relaxed)
    }

    /// Converts the counters to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "events_processed": self.events_processed(),
            "turns_processed": self.turns_processed(),
            "handler_failures": self.handler_failures(),
            "unhandled_events": self.unhandled_events(),
        })
    }
}

/// Drives kernel events and AI turns.
///
/// Events and turns have separate queues, each drained by its own task. Both
/// tasks wait on their queue with a bounded timeout so that [`stop`](Self::stop)
/// takes effect promptly. Submissions never block.
pub struct EventLoop {
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    turns_tx: mpsc::UnboundedSender<Turn>,
    turns_rx: Mutex<Option<mpsc::UnboundedReceiver<Turn>>>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    executor: Option<Arc<ExecutionManager>>,
    generator: Arc<dyn ContentGenerator>,
    wait_timeout: Duration,
    running: AtomicBool,
    event_worker: Mutex<Option<JoinHandle<mpsc::UnboundedReceiver<Event>>>>,
    turn_worker: Mutex<Option<JoinHandle<mpsc::UnboundedReceiver<Turn>>>>,
    stats: EventLoopStats,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(&EventLoopConfig::default())
    }
}

impl EventLoop {
    /// Creates a stopped loop.
    #[must_use]
    pub fn new(config: &EventLoopConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (turns_tx, turns_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            turns_tx,
            turns_rx: Mutex::new(Some(turns_rx)),
            handlers: RwLock::new(HashMap::new()),
            executor: None,
            generator: Arc::new(NoOpContentGenerator),
            wait_timeout: Duration::from_millis(config.wait_timeout_ms.max(1)),
            running: AtomicBool::new(false),
            event_worker: Mutex::new(None),
            turn_worker: Mutex::new(None),
            stats: EventLoopStats::default(),
        }
    }

    /// Sets the manager that runs tool calls found in turns.
    #[must_use]
    pub fn with_execution_manager(mut self, executor: Arc<ExecutionManager>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the collaborator receiving turn output.
    #[must_use]
    pub fn with_content_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Registers an async handler for `event_type`.
    ///
    /// Several handlers may share a type; they run in registration order.
    pub fn register_event_handler<F, Fut>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |event| handler(event).boxed());
        self.handlers
            .write()
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// Queues an event.
    pub fn submit_event(&self, event: Event) {
        if self.events_tx.send(event).is_err() {
            warn!("Event queue closed, dropping event");
        }
    }

    /// Queues an AI response turn.
    pub fn submit_turn(&self, turn: Turn) {
        if self.turns_tx.send(turn).is_err() {
            warn!("Turn queue closed, dropping turn");
        }
    }

    /// Starts both queue workers. Does nothing if already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let (Some(events_rx), Some(turns_rx)) = (self.events_rx.lock().take(), self.turns_rx.lock().take())
        else {
            error!("Event loop queues unavailable, cannot start");
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        *self.event_worker.lock() = Some(tokio::spawn(Arc::clone(self).drain_events(events_rx)));
        *self.turn_worker.lock() = Some(tokio::spawn(Arc::clone(self).drain_turns(turns_rx)));
        info!(wait_timeout = ?self.wait_timeout, "Event loop started");
    }

    /// Stops both workers and waits for them to exit.
    ///
    /// Queued items stay queued and are processed after the next `start`.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let event_worker = self.event_worker.lock().take();
        if let Some(handle) = event_worker {
            match handle.await {
                Ok(rx) => *self.events_rx.lock() = Some(rx),
                Err(e) => error!(error = %e, "Event worker ended abnormally"),
            }
        }
        let turn_worker = self.turn_worker.lock().take();
        if let Some(handle) = turn_worker {
            match handle.await {
                Ok(rx) => *self.turns_rx.lock() = Some(rx),
                Err(e) => error!(error = %e, "Turn worker ended abnormally"),
            }
        }
        info!("Event loop stopped");
    }

    /// Returns true while the workers run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the activity counters.
    #[must_use]
    pub const fn stats(&self) -> &EventLoopStats {
        &self.stats
    }

    async fn drain_events(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Event>,
    ) -> mpsc::UnboundedReceiver<Event> {
        while self.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(self.wait_timeout, rx.recv()).await {
                Ok(Some(event)) => self.dispatch(event).await,
                Ok(None) => break,
                Err(_) => {}
            }
        }
        rx
    }

    async fn drain_turns(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Turn>,
    ) -> mpsc::UnboundedReceiver<Turn> {
        while self.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(self.wait_timeout, rx.recv()).await {
                Ok(Some(turn)) => self.handle_turn(turn).await,
                Ok(None) => break,
                Err(_) => {}
            }
        }
        rx
    }

    /// Runs every handler registered for the event's type.
    ///
    /// Handler errors and panics are logged and counted.
    pub async fn dispatch(&self, event: Event) {
        self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
        let handlers = self
            .handlers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            self.stats.unhandled_events.fetch_add(1, Ordering::Relaxed);
            warn!(event_type = %event.event_type, "No handler for event type");
            return;
        }

        for handler in handlers {
            let event = event.clone();
            let event_type = event.event_type.clone();
            let run = AssertUnwindSafe(async move { handler(event).await });
            match run.catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(event_type = %event_type, error = %e, "Event handler failed");
                }
                Err(_) => {
                    self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(event_type = %event_type, "Event handler panicked");
                }
            }
        }
    }

    /// Processes one turn: content is forwarded, tool calls are executed and
    /// their results handed to the content generator.
    pub async fn handle_turn(&self, turn: Turn) {
        self.stats.turns_processed.fetch_add(1, Ordering::Relaxed);
        debug!(turn_id = %turn.id, items = turn.events.len(), "Processing turn");

        for item in turn.events {
            match item {
                TurnEvent::Content { text } => self.generator.on_content(&turn.id, &text).await,
                TurnEvent::ToolCallRequest { calls } => {
                    let outcomes = match &self.executor {
                        Some(executor) => executor.execute_all(calls).await,
                        None => {
                            warn!(turn_id = %turn.id, "No execution manager, failing tool calls");
                            calls
                                .into_iter()
                                .map(|call| ToolCallOutcome {
                                    result: ToolResult::failure(
                                        &call.name,
                                        "no execution manager configured",
                                    ),
                                    call_id: call.id,
                                    tool_name: call.name,
                                    execution_id: String::new(),
                                })
                                .collect()
                        }
                    };
                    self.generator.on_tool_results(&turn.id, outcomes).await;
                }
                TurnEvent::ToolCallResponse { outcome } => {
                    self.generator.on_tool_results(&turn.id, vec![outcome]).await;
                }
                TurnEvent::Finished { reason } => {
                    self.generator
                        .on_turn_finished(&turn.id, reason.as_deref())
                        .await;
                }
            }
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("running", &self.is_running())
            .field("handler_types", &self.handlers.read().len())
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}
