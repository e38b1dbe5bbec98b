//! The mode orchestrator: a state machine over the six audio activities.
//!
//! Exactly one activity is current at any time, and at most one pipeline
//! exists; the physical codec cannot be shared. Transitions follow the
//! successor chain in [`crate::activity`] plus the event edges below:
//!
//! ```text
//!            boot (no idle media)
//! Idle ────────────────────────────▶ Listening
//!                                        │ wake word
//!                                        ▼
//!                              LocalResponsePlayback
//!                                        │ sink finished
//!                                        ▼
//! CloudResponsePlayback ◀── upload ── SpeechCapture
//!         │                 completed
//!         │ sink finished
//!         ▼
//!     Listening                 CloudAudioPlayback ──▶ Listening
//! ```
//!
//! Every transition tears the current pipeline down completely (stop
//! handshake, stage reset, ring-buffer reset, destroy) before the successor
//! is built. A failed build falls back to a quiescent `Idle` with no
//! pipeline rather than retrying.
//!
//! Events from a torn-down pipeline can still be queued; they are filtered
//! by stage ownership so a stale completion never advances the wrong state.

pub mod runner;
pub mod state;

pub use runner::Orchestrator;
pub use state::OrchestratorState;
