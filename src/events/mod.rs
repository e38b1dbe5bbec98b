//! Single ordered event stream feeding the orchestrator.
//!
//! Two producer families share one unbounded FIFO queue: pipeline-engine
//! worker threads (stage status and metadata) and the peripheral listener
//! thread (button presses). [`EventSender`] is clonable and non-blocking so
//! foreign threads can enqueue without an async context; the orchestrator is
//! the sole consumer through [`EventDispatcher`].
//!
//! Delivery is strictly in enqueue order — no reordering, no coalescing.
//! The orchestrator blocks on [`EventDispatcher::next`] in most states and
//! switches to short-timeout [`EventDispatcher::poll`] while listening, so a
//! long-press can interrupt the detection loop promptly.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::{StageId, StageStatus, StreamInfo};
use crate::peripherals::ButtonId;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Everything the orchestrator reacts to.
///
/// Each variant is produced by exactly one source and consumed exactly once,
/// in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Short press on a physical button.
    PeripheralPressed(ButtonId),
    /// Press held beyond the configured long-press threshold.
    PeripheralLongPressed(ButtonId),
    /// A stage (typically a decoder) reported its stream format.
    StageInfoReported { stage: StageId, info: StreamInfo },
    /// A stage changed engine status.
    StageStatusChanged { stage: StageId, status: StageStatus },
    /// The speech upload session ended, successfully or not.
    TransportCompleted { ok: bool },
}

// ---------------------------------------------------------------------------
// EventSender
// ---------------------------------------------------------------------------

/// Clonable producer handle.
///
/// `send` never blocks (the queue is unbounded) and silently drops events
/// once the dispatcher is gone — producers outliving the orchestrator during
/// shutdown are harmless.
#[derive(Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    pub fn send(&self, event: Event) {
        if self.0.send(event).is_err() {
            log::debug!("events: dispatcher gone, event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// Sole consumer of the event queue.
pub struct EventDispatcher {
    rx: mpsc::UnboundedReceiver<Event>,
    closed: bool,
}

impl EventDispatcher {
    /// Create the queue, returning the producer and consumer halves.
    pub fn channel() -> (EventSender, EventDispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender(tx), EventDispatcher { rx, closed: false })
    }

    /// Await the next event. `None` means every producer has been dropped —
    /// the orchestrator treats that as the shutdown signal.
    pub async fn next(&mut self) -> Option<Event> {
        if self.closed {
            return None;
        }
        let event = self.rx.recv().await;
        if event.is_none() {
            self.closed = true;
        }
        event
    }

    /// Await the next event for at most `timeout`. `None` on timeout is not
    /// an error; check [`is_closed`](Self::is_closed) to tell the two apart.
    pub async fn poll(&mut self, timeout: Duration) -> Option<Event> {
        if self.closed {
            return None;
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }

    /// Whether every producer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
