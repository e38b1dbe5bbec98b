//! Pipeline lifecycle management.
//!
//! The orchestrator never talks to the engine directly; it asks the
//! [`PipelineManager`] to build, start, drain and destroy pipelines, and the
//! manager holds the engine seam and enforces the lifecycle:
//!
//! ```text
//! Built ──start──▶ Running ──drain_and_reset──▶ (Draining) ──▶ Reset
//!   ▲                                                            │
//!   └──────────────────────── start ─────────────────────────────┘
//!                         any state ──destroy──▶ Destroyed
//! ```
//!
//! `drain_and_reset` is atomic from the caller's point of view: once it
//! returns, the full stop handshake has completed and every stage and ring
//! buffer has been reset, so the physical codec is free for the next
//! activity. It is also idempotent, as is `destroy`.

pub mod handle;
pub mod manager;

pub use handle::{PipelineHandle, PipelineLifecycle};
pub use manager::{BuildError, PipelineManager};
