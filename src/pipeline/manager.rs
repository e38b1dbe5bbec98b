//! The pipeline lifecycle manager.

use std::sync::Arc;

use thiserror::Error;

use crate::activity::{describe, Activity, StageRole};
use crate::engine::{AudioEngine, EngineError, StreamInfo};
use crate::events::EventSender;
use crate::upload::ChunkSink;

use super::handle::{PipelineHandle, PipelineLifecycle};

// ---------------------------------------------------------------------------
// BuildError
// ---------------------------------------------------------------------------

/// Pipeline construction failure.
///
/// Fatal for the attempted transition: the orchestrator falls back to idle
/// rather than keeping a half-built pipeline current. Nothing is retained
/// on failure.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The activity has no pipeline topology to build.
    #[error("activity {0:?} has no pipeline topology")]
    NoTopology(Activity),

    /// A stage constructor or the chain link failed inside the engine.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// PipelineManager
// ---------------------------------------------------------------------------

/// Sole mutator of pipeline and stage hardware state.
///
/// Owns the engine seam and the event sender handed to every built chain.
/// All operations take the handle by `&mut` so partial lifecycle states are
/// never observable from another thread.
pub struct PipelineManager {
    engine: Arc<dyn AudioEngine>,
    events: EventSender,
}

impl PipelineManager {
    pub fn new(engine: Arc<dyn AudioEngine>, events: EventSender) -> Self {
        Self { engine, events }
    }

    /// Build the stage chain for `activity`.
    ///
    /// `chunk_sink` is required by topologies containing an upload sink and
    /// ignored otherwise.
    pub fn build(
        &self,
        activity: Activity,
        chunk_sink: Option<Arc<dyn ChunkSink>>,
    ) -> Result<PipelineHandle, BuildError> {
        let descriptor = describe(activity);
        if descriptor.roles.is_empty() {
            return Err(BuildError::NoTopology(activity));
        }

        let inner = self
            .engine
            .build(descriptor.roles, self.events.clone(), chunk_sink)?;
        log::debug!("pipeline: built chain for {}", activity.label());
        Ok(PipelineHandle::new(activity, inner))
    }

    /// Point the topology's source stage at `uri`. Must precede `start`.
    pub fn set_source(
        &self,
        handle: &mut PipelineHandle,
        uri: &str,
    ) -> Result<(), EngineError> {
        let role = describe(handle.activity())
            .source_role()
            .ok_or(EngineError::NotRunning)?;
        match handle.engine_pipeline() {
            Some(pipeline) => pipeline.set_uri(role, uri),
            None => Err(EngineError::NotRunning),
        }
    }

    /// Reconfigure the capture source clock before recording starts.
    pub fn set_capture_clock(
        &self,
        handle: &mut PipelineHandle,
        info: StreamInfo,
    ) -> Result<(), EngineError> {
        match handle.engine_pipeline() {
            Some(pipeline) => pipeline.set_clock(StageRole::CaptureSource, info),
            None => Err(EngineError::NotRunning),
        }
    }

    /// Begin dataflow. Non-blocking; a no-op when already running.
    pub fn start(&self, handle: &mut PipelineHandle) -> Result<(), EngineError> {
        match handle.lifecycle() {
            PipelineLifecycle::Running => Ok(()),
            PipelineLifecycle::Built | PipelineLifecycle::Reset => {
                handle
                    .engine_pipeline()
                    .ok_or(EngineError::NotRunning)?
                    .run()?;
                handle.set_lifecycle(PipelineLifecycle::Running);
                log::info!("pipeline: {} running", handle.activity().label());
                Ok(())
            }
            PipelineLifecycle::Draining | PipelineLifecycle::Destroyed => {
                Err(EngineError::NotRunning)
            }
        }
    }

    /// Stop the pipeline and return its stages to a `Built`-equivalent state.
    ///
    /// The full sequence — stop request, stop handshake, in-flight I/O
    /// termination, stage reset, ring-buffer reset — completes before this
    /// returns, so callers can never observe a partially-drained pipeline.
    /// Engine errors along the way do not abort the sequence; the first one
    /// is returned after every reset step has run.
    ///
    /// Idempotent: draining a handle already in `Built`, `Reset` or
    /// `Destroyed` is a no-op.
    pub fn drain_and_reset(&self, handle: &mut PipelineHandle) -> Result<(), EngineError> {
        match handle.lifecycle() {
            PipelineLifecycle::Built
            | PipelineLifecycle::Reset
            | PipelineLifecycle::Destroyed => return Ok(()),
            PipelineLifecycle::Running | PipelineLifecycle::Draining => {}
        }

        let activity = handle.activity();
        handle.set_lifecycle(PipelineLifecycle::Draining);
        let pipeline = handle.engine_pipeline().ok_or(EngineError::NotRunning)?;

        let mut first_error = None;
        let mut note = |result: Result<(), EngineError>| {
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        };

        note(pipeline.stop());
        note(pipeline.wait_for_stop());
        note(pipeline.terminate());
        pipeline.reset_stages();
        pipeline.reset_ringbuffers();

        handle.set_lifecycle(PipelineLifecycle::Reset);
        log::info!("pipeline: {} drained and reset", activity.label());

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Propagate decoder-reported stream info to the codec sink.
    ///
    /// Applies the metadata and reconfigures the sink clock so
    /// rate-sensitive output can proceed. A no-op on handles that are not
    /// `Running` or whose topology has no codec sink — some activities never
    /// report stream info.
    pub fn apply_stream_info(&self, handle: &mut PipelineHandle, info: StreamInfo) {
        if handle.lifecycle() != PipelineLifecycle::Running {
            return;
        }
        let Some(pipeline) = handle.engine_pipeline() else {
            return;
        };
        if pipeline.stage_id(StageRole::CodecSink).is_none() {
            return;
        }

        pipeline.set_stream_info(StageRole::CodecSink, info);
        if let Err(e) = pipeline.set_clock(StageRole::CodecSink, info) {
            log::warn!("pipeline: sink clock reconfiguration failed: {e}");
        } else {
            log::info!("pipeline: sink clock set to {info}");
        }
    }

    /// Release the pipeline's stages. Idempotent; safe on a drained handle.
    ///
    /// This is the only place engine resources are freed. A handle still
    /// running is drained first.
    pub fn destroy(&self, handle: &mut PipelineHandle) {
        if handle.lifecycle() == PipelineLifecycle::Destroyed {
            return;
        }
        if let Err(e) = self.drain_and_reset(handle) {
            log::warn!("pipeline: drain during destroy failed: {e}");
        }
        drop(handle.take_engine_pipeline());
        handle.set_lifecycle(PipelineLifecycle::Destroyed);
        log::debug!("pipeline: {} destroyed", handle.activity().label());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
