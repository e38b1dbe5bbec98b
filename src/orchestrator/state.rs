//! Current-activity state.

use crate::activity::Activity;
use crate::pipeline::PipelineHandle;

/// The orchestrator's mutable core: which activity is current and the
/// pipeline serving it.
///
/// `pipeline` is `None` only in quiescent `Idle` (after a failed build or
/// before boot); every other activity owns exactly one handle.
#[derive(Debug, Default)]
pub struct OrchestratorState {
    pub current: Activity,
    pub pipeline: Option<PipelineHandle>,
}
