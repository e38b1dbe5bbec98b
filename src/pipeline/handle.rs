//! Pipeline handle and lifecycle state.

use std::sync::Arc;

use crate::activity::{Activity, StageRole};
use crate::engine::{EnginePipeline, FrameSource, StageId};

// ---------------------------------------------------------------------------
// PipelineLifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of one built pipeline.
///
/// A handle must reach `Reset` before its stages may be reused by a
/// different activity, and `Destroyed` before process shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineLifecycle {
    /// Stages allocated and linked, dataflow not started.
    Built,
    /// Dataflow active on the engine's worker threads.
    Running,
    /// Stop handshake in progress (never observable through the manager —
    /// `drain_and_reset` completes the whole sequence before returning).
    Draining,
    /// Fully stopped and reset; equivalent to `Built` for reuse purposes.
    Reset,
    /// Stages released. Terminal.
    Destroyed,
}

// ---------------------------------------------------------------------------
// PipelineHandle
// ---------------------------------------------------------------------------

/// Exclusive owner of one engine pipeline and its lifecycle state.
///
/// Constructed by [`crate::pipeline::PipelineManager::build`]; mutated only
/// through the manager.
pub struct PipelineHandle {
    activity: Activity,
    lifecycle: PipelineLifecycle,
    /// `None` once destroyed.
    inner: Option<Box<dyn EnginePipeline>>,
    /// Stage ids cached at build time so stale-event filtering still works
    /// while the handle is being torn down.
    stage_ids: Vec<StageId>,
}

impl PipelineHandle {
    pub(crate) fn new(activity: Activity, inner: Box<dyn EnginePipeline>) -> Self {
        let stage_ids = inner.stage_ids();
        Self {
            activity,
            lifecycle: PipelineLifecycle::Built,
            inner: Some(inner),
            stage_ids,
        }
    }

    /// The activity this pipeline was built for.
    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn lifecycle(&self) -> PipelineLifecycle {
        self.lifecycle
    }

    /// Whether `stage` belongs to this pipeline.
    pub fn owns_stage(&self, stage: StageId) -> bool {
        self.stage_ids.contains(&stage)
    }

    /// Id of the stage filling `role`, if present in this topology.
    pub fn stage_id(&self, role: StageRole) -> Option<StageId> {
        self.inner.as_ref().and_then(|p| p.stage_id(role))
    }

    /// Raw-tap reader for the listening loop.
    pub fn frame_source(&self) -> Option<Arc<dyn FrameSource>> {
        self.inner.as_ref().and_then(|p| p.frame_source())
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: PipelineLifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn engine_pipeline(&mut self) -> Option<&mut Box<dyn EnginePipeline>> {
        self.inner.as_mut()
    }

    pub(crate) fn take_engine_pipeline(&mut self) -> Option<Box<dyn EnginePipeline>> {
        self.inner.take()
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("activity", &self.activity)
            .field("lifecycle", &self.lifecycle)
            .field("stage_ids", &self.stage_ids)
            .finish_non_exhaustive()
    }
}
