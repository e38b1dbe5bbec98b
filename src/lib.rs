//! Voicebox — control core of a voice-interaction device.
//!
//! The device runs exactly one audio activity at a time: idle playback,
//! wake-word listening, speech capture with streaming upload, or one of the
//! playback responses. This crate owns that state machine and the lifecycle
//! of the single audio pipeline serving the current activity; the streaming
//! engine itself (stage worker threads, ring buffers, codec I/O) sits behind
//! the [`engine`] seams.
//!
//! # Module map
//!
//! - [`activity`] — activity variants, stage topologies, successor chain.
//! - [`engine`] — consumed interface of the streaming audio engine.
//! - [`events`] — the single ordered event queue.
//! - [`pipeline`] — pipeline build / start / drain / destroy lifecycle.
//! - [`detect`] — consumed interface of the wake-word model.
//! - [`upload`] — chunked streaming speech upload.
//! - [`peripherals`] — buttons, display, provisioning seams.
//! - [`orchestrator`] — the event loop tying it all together.
//! - [`config`] — TOML settings and platform paths.

pub mod activity;
pub mod config;
pub mod detect;
pub mod engine;
pub mod events;
pub mod orchestrator;
pub mod peripherals;
pub mod pipeline;
pub mod upload;
