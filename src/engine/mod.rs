//! Consumed interface of the external streaming audio engine.
//!
//! The engine itself — element worker threads, ring buffers, DMA — lives
//! outside this crate. This module defines the seams the control core talks
//! through:
//!
//! - [`AudioEngine`] builds a linked stage chain for a requested topology and
//!   attaches the event listener so stage status/metadata surface as
//!   [`crate::events::Event`]s.
//! - [`EnginePipeline`] exposes the lifecycle and per-stage operations the
//!   lifecycle manager drives (`run`, `stop`, `wait_for_stop`, `terminate`,
//!   stage resets, ring-buffer resets, URI/clock configuration).
//! - [`FrameSource`] is the raw-tap read handle the listening loop blocks on,
//!   one fixed-size PCM frame per call.
//!
//! All traits are object-safe and consumed behind `Arc<dyn …>` / `Box<dyn …>`
//! so tests can substitute the in-memory [`mock::MockEngine`].

use std::sync::Arc;

use thiserror::Error;

use crate::activity::StageRole;
use crate::events::EventSender;
use crate::upload::ChunkSink;

// ---------------------------------------------------------------------------
// StreamInfo / StageId / StageStatus
// ---------------------------------------------------------------------------

/// Stream format discovered mid-stream (e.g. from a decoder header parse).
///
/// The codec sink needs these values applied to its clock before
/// rate-sensitive output can proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl std::fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz / {} bit / {} ch",
            self.sample_rate, self.bit_depth, self.channels
        )
    }
}

/// Opaque identifier of one stage instance. Unique for the lifetime of the
/// process, never reused, so events from a torn-down pipeline can be told
/// apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub u64);

/// Engine-reported stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Running,
    Stopped,
    Finished,
    Error,
}

impl StageStatus {
    /// Whether this status marks the end of the stage's dataflow.
    ///
    /// `Error` is deliberately included: the orchestrator treats an engine
    /// fault exactly like normal completion (drain and advance).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Stopped | StageStatus::Finished | StageStatus::Error
        )
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors surfaced by the engine seam.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A stage constructor failed while building a chain.
    #[error("stage construction failed ({role:?}): {reason}")]
    StageInit { role: StageRole, reason: String },

    /// The built stages could not be linked into one chain.
    #[error("pipeline link failed: {0}")]
    Link(String),

    /// An engine I/O operation failed.
    #[error("engine i/o error: {0}")]
    Io(String),

    /// The operation requires a running pipeline.
    #[error("pipeline is not running")]
    NotRunning,

    /// The engine cannot provide this capability on the current host.
    #[error("unsupported on this host: {0}")]
    Unsupported(String),
}

// ---------------------------------------------------------------------------
// FrameSource
// ---------------------------------------------------------------------------

/// Blocking read handle over a listening pipeline's raw PCM tap.
///
/// `read_frame` blocks until one full frame is available — it is the
/// scheduling yield point of the listening state. A slow consumer drops
/// frames at the source ring buffer rather than blocking capture.
pub trait FrameSource: Send + Sync {
    /// Fill `buf` with exactly one frame of 16-bit mono PCM.
    ///
    /// Returns the number of samples written; anything short of `buf.len()`
    /// means the frame could not be completed and must be discarded.
    fn read_frame(&self, buf: &mut [i16]) -> Result<usize, EngineError>;
}

// ---------------------------------------------------------------------------
// EnginePipeline
// ---------------------------------------------------------------------------

/// One built stage chain, addressed by stage role.
///
/// Obtained from [`AudioEngine::build`]; owned exclusively by the pipeline
/// lifecycle manager while its activity is current.
pub trait EnginePipeline: Send {
    /// Ids of every stage in the chain, in chain order.
    fn stage_ids(&self) -> Vec<StageId>;

    /// Id of the stage filling `role`, if the topology contains one.
    fn stage_id(&self, role: StageRole) -> Option<StageId>;

    /// Point the stage at a source/target URI before `run`.
    fn set_uri(&mut self, role: StageRole, uri: &str) -> Result<(), EngineError>;

    /// Reconfigure the stage's hardware clock (codec I/O).
    fn set_clock(&mut self, role: StageRole, info: StreamInfo) -> Result<(), EngineError>;

    /// Push stream metadata onto a stage without touching its clock.
    fn set_stream_info(&mut self, role: StageRole, info: StreamInfo);

    /// Begin dataflow on the engine's worker threads. Non-blocking.
    fn run(&mut self) -> Result<(), EngineError>;

    /// Request stop. Dataflow ends asynchronously.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Block until the engine confirms the stop handshake.
    fn wait_for_stop(&mut self) -> Result<(), EngineError>;

    /// Terminate in-flight stage I/O.
    fn terminate(&mut self) -> Result<(), EngineError>;

    /// Reset every stage's internal state so stages are reusable.
    fn reset_stages(&mut self);

    /// Clear the inter-stage ring buffers.
    fn reset_ringbuffers(&mut self);

    /// The raw-tap reader, present only in topologies with a
    /// [`StageRole::RawTap`] stage.
    fn frame_source(&self) -> Option<Arc<dyn FrameSource>>;
}

// Compile-time assertion: the trait must remain object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn EnginePipeline>) {}
};

// ---------------------------------------------------------------------------
// AudioEngine
// ---------------------------------------------------------------------------

/// Factory for stage chains.
///
/// `build` allocates the stages of `roles` in order, wires them into one
/// chain and attaches `events` so stage status and metadata surface as
/// [`crate::events::Event`]s. On failure nothing is retained — the caller
/// never sees a partially-built chain.
///
/// `chunk_sink` is handed to the [`StageRole::UploadSink`] stage when the
/// topology contains one; the engine invokes it from its worker thread with
/// each outgoing buffer.
pub trait AudioEngine: Send + Sync {
    fn build(
        &self,
        roles: &'static [StageRole],
        events: EventSender,
        chunk_sink: Option<Arc<dyn ChunkSink>>,
    ) -> Result<Box<dyn EnginePipeline>, EngineError>;
}

// ---------------------------------------------------------------------------
// MockEngine  (test-only)
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
