//! Event sink trait and implementations.

use crate::core::{ProgressEvent, StageRole};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};

/// Receives progress events as a workflow runs.
///
/// The orchestrator emits one event per log entry, in log order.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event, waiting for capacity if the sink is bounded.
    async fn emit(&self, event: &ProgressEvent);
}

/// Discards all events. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &ProgressEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &ProgressEvent) {
        let stage = event.stage.map_or("workflow", |s| s.as_str());
        if self.level == Level::DEBUG {
            debug!(
                run_id = %event.run_id,
                stage,
                action = %event.action,
                progress = event.progress,
                "{}", event.detail
            );
        } else {
            info!(
                run_id = %event.run_id,
                stage,
                action = %event.action,
                progress = event.progress,
                "{}", event.detail
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &ProgressEvent) {
        self.log_event(event);
    }
}

/// Keeps every event in memory. Used by tests and batch callers.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<ProgressEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the action names in emission order.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.action.clone()).collect()
    }

    /// Returns events concerning one stage.
    #[must_use]
    pub fn events_for_stage(&self, stage: StageRole) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stage == Some(stage))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &ProgressEvent) {
        self.events.write().push(event.clone());
    }
}

/// Forwards events into a bounded channel, e.g. for a UI task.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiving half of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &ProgressEvent) {
        if self.sender.send(event.clone()).await.is_err() {
            debug!(action = %event.action, "Progress receiver dropped");
        }
    }
}
