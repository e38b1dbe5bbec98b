//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the tokio runtime.
//! 4. Load the wake-word model (degrade to a stub when absent) and print the
//!    boot banner: keyword names, thresholds, frame size.
//! 5. Wire the upload transport, event queue, pipeline manager and button
//!    listener.
//! 6. Run the orchestrator — blocks until every event producer is gone.

use std::sync::Arc;

use anyhow::{bail, Context};

use voicebox::{
    config::AppConfig,
    detect::{DetectError, KeywordDetector},
    engine::{AudioEngine, EngineError, EnginePipeline},
    events::{EventDispatcher, EventSender},
    orchestrator::Orchestrator,
    peripherals::{parse_key, ButtonId, ButtonListener, LogDisplay, LogProvisioner},
    pipeline::PipelineManager,
    upload::{ChunkSink, HttpUploadTransport, SpeechUploader, UploadTransport},
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voicebox starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Wake-word model. No model integration is wired on a plain host, so
    //    the stub keeps the control core running with detection disabled.
    let detector: Arc<dyn KeywordDetector> = Arc::new(NoWakeModel);
    print_boot_banner(detector.as_ref());
    if detector.chunk_size() == 0 {
        bail!("wake-word model reports a zero frame size; cannot size the raw tap");
    }

    // 5. Wiring
    let (events, dispatcher) = EventDispatcher::channel();

    let transport: Arc<dyn UploadTransport> = Arc::new(
        HttpUploadTransport::new(&config.upload, rt.handle().clone())
            .context("building upload transport")?,
    );
    let uploader: Arc<dyn ChunkSink> = Arc::new(SpeechUploader::new(
        transport,
        &config.upload,
        events.clone(),
    ));

    // The streaming engine is platform-provided; this host binary runs the
    // control core against the unsupported stub so config, buttons and
    // provisioning can be exercised off-device.
    let engine: Arc<dyn AudioEngine> = Arc::new(NullEngine);
    let manager = PipelineManager::new(engine, events.clone());

    let _buttons = start_buttons(&config, events.clone());

    let mut orchestrator = Orchestrator::new(
        manager,
        dispatcher,
        detector,
        uploader,
        Arc::new(LogDisplay),
        Arc::new(LogProvisioner),
        config,
    );

    // 6. Run
    rt.block_on(orchestrator.run());
    Ok(())
}

fn print_boot_banner(detector: &dyn KeywordDetector) {
    log::info!(
        "wake-word model: {} keyword(s), {} samples/frame @ {} Hz",
        detector.word_count(),
        detector.chunk_size(),
        detector.sample_rate()
    );
    for index in 1..=detector.word_count() {
        let name = detector
            .word_name(index)
            .unwrap_or_else(|| format!("keyword #{index}"));
        log::info!("  [{index}] {name} (threshold {})", detector.threshold(index));
    }
}

fn start_buttons(config: &AppConfig, events: EventSender) -> Option<ButtonListener> {
    let mut bindings = Vec::new();
    for (name, id) in [
        (config.button.mode_key.as_str(), ButtonId::Mode),
        (config.button.set_key.as_str(), ButtonId::Set),
    ] {
        match parse_key(name) {
            Some(key) => bindings.push((key, id)),
            None => log::warn!("unknown key {name:?} for the {} button", id.label()),
        }
    }
    if bindings.is_empty() {
        log::warn!("no button bindings; long-press actions unavailable");
        return None;
    }

    let long_press = std::time::Duration::from_millis(config.button.long_press_ms);
    match ButtonListener::start(bindings, long_press, events) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("button listener unavailable: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// NoWakeModel — fallback detector when no model is integrated
// ---------------------------------------------------------------------------

/// Detector stub that never matches, so the app still launches on hosts
/// without a wake-word model.
struct NoWakeModel;

impl KeywordDetector for NoWakeModel {
    fn detect(&self, _frame: &[i16]) -> Result<usize, DetectError> {
        Ok(0)
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn chunk_size(&self) -> usize {
        512
    }

    fn threshold(&self, _index: usize) -> f32 {
        0.0
    }

    fn word_name(&self, _index: usize) -> Option<String> {
        None
    }

    fn word_count(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// NullEngine — fallback engine on hosts without the streaming stack
// ---------------------------------------------------------------------------

/// Engine stub whose builds always fail, dropping the orchestrator into
/// quiescent idle while the rest of the app stays usable.
struct NullEngine;

impl AudioEngine for NullEngine {
    fn build(
        &self,
        _roles: &'static [voicebox::activity::StageRole],
        _events: EventSender,
        _chunk_sink: Option<Arc<dyn ChunkSink>>,
    ) -> Result<Box<dyn EnginePipeline>, EngineError> {
        Err(EngineError::Unsupported(
            "no streaming audio engine on this host".into(),
        ))
    }
}
