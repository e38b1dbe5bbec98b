//! The orchestrator event loop and transition rules.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::seq::SliceRandom;

use crate::activity::{describe, Activity};
use crate::config::AppConfig;
use crate::detect::KeywordDetector;
use crate::engine::{StageId, StageStatus, StreamInfo};
use crate::events::{Event, EventDispatcher};
use crate::peripherals::{ButtonId, DisplayPattern, DisplayService, ProvisioningService};
use crate::pipeline::PipelineManager;
use crate::upload::ChunkSink;

use super::state::OrchestratorState;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owner of the activity state machine.
///
/// Single-threaded by construction: all transitions happen inside
/// [`run`](Self::run), either in response to a dispatched event or a wake
/// word from the listening loop. Nothing else mutates the current activity.
pub struct Orchestrator {
    state: OrchestratorState,
    manager: PipelineManager,
    dispatcher: EventDispatcher,
    detector: Arc<dyn KeywordDetector>,
    chunk_sink: Arc<dyn ChunkSink>,
    display: Arc<dyn DisplayService>,
    provisioning: Arc<dyn ProvisioningService>,
    config: AppConfig,
    /// Reused frame buffer, moved in and out of the blocking read task.
    frame_buf: Option<Vec<i16>>,
    running: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: PipelineManager,
        dispatcher: EventDispatcher,
        detector: Arc<dyn KeywordDetector>,
        chunk_sink: Arc<dyn ChunkSink>,
        display: Arc<dyn DisplayService>,
        provisioning: Arc<dyn ProvisioningService>,
        config: AppConfig,
    ) -> Self {
        Self {
            state: OrchestratorState::default(),
            manager,
            dispatcher,
            detector,
            chunk_sink,
            display,
            provisioning,
            config,
            frame_buf: None,
            running: true,
        }
    }

    /// Run until every event producer is gone, then tear down.
    pub async fn run(&mut self) {
        let startup = self.config.startup;
        log::info!("orchestrator: starting in {}", startup.label());
        self.enter(startup);

        while self.running {
            if self.state.current == Activity::Listening && self.state.pipeline.is_some() {
                self.listening_tick().await;
            } else {
                match self.dispatcher.next().await {
                    Some(event) => self.dispatch(event),
                    None => self.running = false,
                }
            }
        }

        self.teardown_current();
        self.display.set_pattern(DisplayPattern::Off);
        log::info!("orchestrator: shut down");
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    /// Apply one event to the state machine. Synchronous: by the time this
    /// returns the transition (if any) is complete.
    fn dispatch(&mut self, event: Event) {
        match event {
            Event::PeripheralPressed(id) => {
                log::info!("button: {} pressed", id.label());
            }

            Event::PeripheralLongPressed(ButtonId::Mode) => {
                log::info!("button: mode long-pressed, restarting pairing");
                self.provisioning.restart_pairing();
            }

            Event::PeripheralLongPressed(id) => {
                log::info!("button: {} long-pressed (unbound)", id.label());
            }

            Event::StageInfoReported { stage, info } => {
                let Some(handle) = self.state.pipeline.as_mut() else {
                    return;
                };
                if !handle.owns_stage(stage) {
                    log::debug!("stale stream info from {stage:?} ignored");
                    return;
                }
                log::info!("stream info reported: {info}");
                self.manager.apply_stream_info(handle, info);
            }

            Event::StageStatusChanged { stage, status } => {
                self.on_stage_status(stage, status);
            }

            Event::TransportCompleted { ok } => {
                if self.state.current != Activity::SpeechCapture {
                    log::debug!("transport completion outside speech capture ignored");
                    return;
                }
                if ok {
                    log::info!("upload complete, fetching spoken reply");
                } else {
                    log::warn!("upload failed, advancing anyway");
                }
                self.advance();
            }
        }
    }

    fn on_stage_status(&mut self, stage: StageId, status: StageStatus) {
        if !status.is_terminal() {
            return;
        }
        let Some(handle) = self.state.pipeline.as_ref() else {
            log::debug!("stage status with no pipeline ignored");
            return;
        };
        if !handle.owns_stage(stage) {
            log::debug!("stale status {status:?} from {stage:?} ignored");
            return;
        }

        // Only the terminal sink stage marks activity completion.
        let sink = describe(self.state.current)
            .sink_role()
            .and_then(|role| handle.stage_id(role));
        if sink != Some(stage) {
            return;
        }

        if status == StageStatus::Error {
            log::warn!(
                "{} sink reported an error, treating as completion",
                self.state.current.label()
            );
        }
        self.advance();
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Enter `target`, tearing down whatever is current first.
    ///
    /// `Idle` with no idle media configured resolves to its successor before
    /// anything is built, so boot lands directly in `Listening`.
    fn enter(&mut self, target: Activity) {
        let target = if target == Activity::Idle && self.config.media.idle_media.is_none() {
            log::info!("no idle media configured, skipping to listening");
            describe(Activity::Idle).successor
        } else {
            target
        };

        if let Err(e) = self.build_and_start(target) {
            log::error!("failed to enter {}: {e:#}", target.label());
            self.quiesce();
        }
    }

    fn build_and_start(&mut self, target: Activity) -> anyhow::Result<()> {
        self.teardown_current();

        let chunk_sink =
            (target == Activity::SpeechCapture).then(|| Arc::clone(&self.chunk_sink));
        let mut handle = self
            .manager
            .build(target, chunk_sink)
            .with_context(|| format!("building {} pipeline", target.label()))?;

        if let Some(uri) = self.source_uri(target) {
            self.manager
                .set_source(&mut handle, &uri)
                .with_context(|| format!("pointing {} at {uri}", target.label()))?;
        }
        if target == Activity::SpeechCapture {
            let info = StreamInfo {
                sample_rate: self.config.upload.sample_rate,
                bit_depth: self.config.upload.bit_depth,
                channels: self.config.upload.channels,
            };
            self.manager
                .set_capture_clock(&mut handle, info)
                .context("setting capture clock")?;
        }

        self.manager.start(&mut handle).context("starting pipeline")?;

        self.state.current = target;
        self.state.pipeline = Some(handle);
        self.display.set_pattern(display_pattern(target));
        log::info!("activity: {}", target.label());
        Ok(())
    }

    /// Source URI for the activity's first stage, if it needs one.
    fn source_uri(&self, target: Activity) -> Option<String> {
        match target {
            Activity::Idle => self.config.media.idle_media.clone(),
            Activity::LocalResponsePlayback => {
                let clip = self
                    .config
                    .media
                    .response_clips
                    .choose(&mut rand::thread_rng())
                    .cloned();
                if clip.is_none() {
                    log::warn!("no response clips configured");
                }
                clip
            }
            Activity::CloudResponsePlayback => Some(self.config.media.cloud_reply_url.clone()),
            Activity::CloudAudioPlayback => Some(self.config.media.cloud_media_url.clone()),
            Activity::Listening | Activity::SpeechCapture => None,
        }
    }

    /// Move to the current activity's successor.
    fn advance(&mut self) {
        let next = describe(self.state.current).successor;
        log::info!(
            "advance: {} -> {}",
            self.state.current.label(),
            next.label()
        );
        self.enter(next);
    }

    /// Tear the current pipeline down completely. No-op when quiescent.
    fn teardown_current(&mut self) {
        if let Some(mut handle) = self.state.pipeline.take() {
            if let Err(e) = self.manager.drain_and_reset(&mut handle) {
                log::warn!("teardown of {} reported: {e}", handle.activity().label());
            }
            self.manager.destroy(&mut handle);
        }
    }

    /// Fall back to quiescent idle: no pipeline, indicator off. Never
    /// auto-advances, so a persistent build failure cannot ping-pong.
    fn quiesce(&mut self) {
        self.teardown_current();
        self.state.current = Activity::Idle;
        self.display.set_pattern(DisplayPattern::Off);
        log::info!("activity: idle (quiescent)");
    }

    // -----------------------------------------------------------------------
    // Listening loop
    // -----------------------------------------------------------------------

    /// One iteration of the listening state: poll the event queue briefly so
    /// button presses stay responsive, then pull one raw frame and run the
    /// detector on the blocking thread pool.
    async fn listening_tick(&mut self) {
        let poll = Duration::from_millis(self.config.detect.button_poll_ms);
        if let Some(event) = self.dispatcher.poll(poll).await {
            self.dispatch(event);
            return;
        }
        if self.dispatcher.is_closed() {
            self.running = false;
            return;
        }

        let Some(source) = self.state.pipeline.as_ref().and_then(|p| p.frame_source())
        else {
            log::error!("listening pipeline has no raw tap");
            self.quiesce();
            return;
        };

        let detector = Arc::clone(&self.detector);
        let chunk = detector.chunk_size();
        let mut buf = self.frame_buf.take().unwrap_or_default();
        buf.resize(chunk, 0);

        let result = tokio::task::spawn_blocking(move || {
            let read = source.read_frame(&mut buf);
            let detected = match read {
                Ok(n) if n == buf.len() => detector.detect(&buf),
                _ => Ok(0),
            };
            (buf, read, detected)
        })
        .await;

        let (buf, read, detected) = match result {
            Ok(parts) => parts,
            Err(e) => {
                log::error!("listening worker panicked: {e}");
                self.quiesce();
                return;
            }
        };
        self.frame_buf = Some(buf);

        match read {
            Ok(n) if n == chunk => {}
            Ok(n) => {
                log::debug!("short frame ({n}/{chunk} samples), discarded");
                return;
            }
            Err(e) => {
                // Retry on the next tick; the per-tick event poll keeps a
                // persistently failing tap from spinning hot.
                log::warn!("raw tap read failed: {e}");
                return;
            }
        }

        match detected {
            Ok(index) if index == self.config.detect.keyword_index => {
                let word = self
                    .detector
                    .word_name(index)
                    .unwrap_or_else(|| format!("#{index}"));
                log::info!("wake word detected: {word}");
                self.advance();
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("detector error: {e}");
            }
        }
    }
}

fn display_pattern(activity: Activity) -> DisplayPattern {
    match activity {
        Activity::Idle => DisplayPattern::Off,
        Activity::Listening => DisplayPattern::Listening,
        Activity::SpeechCapture => DisplayPattern::Recording,
        Activity::LocalResponsePlayback
        | Activity::CloudResponsePlayback
        | Activity::CloudAudioPlayback => DisplayPattern::Playing,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::StageRole;
    use crate::detect::MockDetector;
    use crate::engine::mock::MockEngine;
    use crate::engine::AudioEngine;
    use crate::events::EventSender;
    use crate::peripherals::mock::{MockDisplay, MockProvisioner};

    use std::sync::Mutex;

    const CHUNK: usize = 4;

    /// Chunk sink double recording what the capture pipeline would feed it.
    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<Vec<u8>>>,
        ended: Mutex<usize>,
    }

    impl ChunkSink for RecordingSink {
        fn on_chunk(&self, data: &[u8]) -> isize {
            self.chunks.lock().unwrap().push(data.to_vec());
            data.len() as isize
        }

        fn on_end(&self) {
            *self.ended.lock().unwrap() += 1;
        }
    }

    struct Fixture {
        engine: Arc<MockEngine>,
        detector: Arc<MockDetector>,
        display: Arc<MockDisplay>,
        provisioning: Arc<MockProvisioner>,
        tx: EventSender,
        orch: Orchestrator,
    }

    fn fixture(config: AppConfig) -> Fixture {
        let engine = MockEngine::new();
        let (tx, rx) = EventDispatcher::channel();
        let manager =
            PipelineManager::new(Arc::clone(&engine) as Arc<dyn AudioEngine>, tx.clone());
        let detector = Arc::new(MockDetector::new(CHUNK));
        let display = Arc::new(MockDisplay::default());
        let provisioning = Arc::new(MockProvisioner::default());
        let orch = Orchestrator::new(
            manager,
            rx,
            Arc::clone(&detector) as Arc<dyn KeywordDetector>,
            Arc::new(RecordingSink::default()),
            Arc::clone(&display) as Arc<dyn DisplayService>,
            Arc::clone(&provisioning) as Arc<dyn ProvisioningService>,
            config,
        );
        Fixture {
            engine,
            detector,
            display,
            provisioning,
            tx,
            orch,
        }
    }

    fn sink_stage(orch: &Orchestrator) -> StageId {
        let handle = orch.state.pipeline.as_ref().expect("pipeline");
        let role = describe(orch.state.current).sink_role().expect("sink role");
        handle.stage_id(role).expect("sink stage")
    }

    #[tokio::test]
    async fn boot_without_idle_media_lands_in_listening() {
        let mut f = fixture(AppConfig::default());

        f.orch.enter(Activity::Idle);

        assert_eq!(f.orch.state.current, Activity::Listening);
        // The idle playback pipeline was never built.
        assert_eq!(f.engine.trace.count(".build"), 1);
        assert_eq!(
            *f.display.patterns.lock().unwrap().last().unwrap(),
            DisplayPattern::Listening
        );
    }

    #[tokio::test]
    async fn boot_with_idle_media_plays_it_first() {
        let mut config = AppConfig::default();
        config.media.idle_media = Some("/sdcard/boot.mp3".into());
        let mut f = fixture(config);

        f.orch.enter(Activity::Idle);

        assert_eq!(f.orch.state.current, Activity::Idle);
        assert_eq!(
            f.engine.trace.count("p0.set_uri(LocalSource,/sdcard/boot.mp3)"),
            1
        );

        // Playback finishing advances into the wake round trip.
        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        });
        assert_eq!(f.orch.state.current, Activity::Listening);
    }

    #[tokio::test]
    async fn wake_word_advances_to_local_response() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await;

        assert_eq!(f.orch.state.current, Activity::LocalResponsePlayback);
        assert_eq!(
            f.engine.trace.count("p1.set_uri(LocalSource,/spiffs/wake-ack-"),
            1,
            "a response clip was selected"
        );
    }

    #[tokio::test]
    async fn non_wake_keywords_are_ignored() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(2));
        f.orch.listening_tick().await;

        assert_eq!(f.orch.state.current, Activity::Listening);
    }

    #[tokio::test]
    async fn short_frames_are_discarded_without_detection() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        f.engine.push_frame(vec![0; CHUNK - 1]);
        // A scripted detection that must never be consumed.
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await;

        assert_eq!(f.orch.state.current, Activity::Listening);
    }

    #[tokio::test]
    async fn raw_tap_errors_do_not_abandon_listening() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        // No frames queued: the tap read errors. Listening continues.
        f.orch.listening_tick().await;
        assert_eq!(f.orch.state.current, Activity::Listening);
        assert!(f.orch.state.pipeline.is_some());

        // Detection still works once frames flow again.
        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await;
        assert_eq!(f.orch.state.current, Activity::LocalResponsePlayback);
    }

    #[tokio::test]
    async fn full_round_trip_keeps_one_pipeline_running() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle); // -> Listening (p0)

        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await; // -> LocalResponsePlayback (p1)

        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        }); // -> SpeechCapture (p2)
        assert_eq!(f.orch.state.current, Activity::SpeechCapture);
        assert_eq!(
            f.engine.trace.count("p2.set_clock(CaptureSource,16000/16/1)"),
            1,
            "capture clock reconfigured for upload"
        );
        assert_eq!(
            *f.display.patterns.lock().unwrap().last().unwrap(),
            DisplayPattern::Recording
        );

        f.orch.dispatch(Event::TransportCompleted { ok: true }); // -> CloudResponsePlayback (p3)
        assert_eq!(f.orch.state.current, Activity::CloudResponsePlayback);
        assert_eq!(
            f.engine
                .trace
                .count("p3.set_uri(HttpSource,http://192.168.0.174/ai/tts/output.mp3)"),
            1
        );

        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        }); // -> Listening (p4)
        assert_eq!(f.orch.state.current, Activity::Listening);

        assert_eq!(f.engine.trace.max_running(), 1, "pipelines never overlap");
    }

    #[tokio::test]
    async fn predecessor_is_fully_torn_down_before_successor_builds() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle); // p0

        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await; // p0 torn down, p1 built

        let calls = f.engine.trace.calls();
        let teardown_done = calls
            .iter()
            .position(|c| c == "p0.reset_ringbuffers")
            .expect("p0 was reset");
        let dropped = calls.iter().position(|c| c == "p0.dropped").expect("p0 dropped");
        let next_build = calls.iter().position(|c| c == "p1.build").expect("p1 built");
        assert!(teardown_done < next_build);
        assert!(dropped < next_build);
        assert_eq!(f.engine.trace.count("p0.stop"), 1, "exactly one drain");
    }

    #[tokio::test]
    async fn failed_upload_still_fetches_the_reply() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);
        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await;
        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        });
        assert_eq!(f.orch.state.current, Activity::SpeechCapture);

        f.orch.dispatch(Event::TransportCompleted { ok: false });
        assert_eq!(f.orch.state.current, Activity::CloudResponsePlayback);
    }

    /// An engine-side halt of the capture chain must complete the activity
    /// even when the upload never produced a transport report, otherwise the
    /// device would wait on that report forever.
    #[tokio::test]
    async fn capture_sink_halt_advances_without_transport_report() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);
        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await;
        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        });
        assert_eq!(f.orch.state.current, Activity::SpeechCapture);

        let upload_sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: upload_sink,
            status: StageStatus::Stopped,
        });
        assert_eq!(f.orch.state.current, Activity::CloudResponsePlayback);

        // A transport report straggling in afterwards is dropped, so the
        // two completion paths never double-transition.
        f.orch.dispatch(Event::TransportCompleted { ok: false });
        assert_eq!(f.orch.state.current, Activity::CloudResponsePlayback);
    }

    #[tokio::test]
    async fn capture_sink_error_advances_without_transport_report() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);
        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await;
        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        });
        assert_eq!(f.orch.state.current, Activity::SpeechCapture);

        let upload_sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: upload_sink,
            status: StageStatus::Error,
        });
        assert_eq!(f.orch.state.current, Activity::CloudResponsePlayback);
    }

    #[tokio::test]
    async fn transport_completion_outside_speech_capture_is_ignored() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        f.orch.dispatch(Event::TransportCompleted { ok: true });
        assert_eq!(f.orch.state.current, Activity::Listening);
    }

    #[tokio::test]
    async fn stale_stage_events_never_advance_the_new_activity() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle); // Listening, p0
        let old_sink = sink_stage(&f.orch);

        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await; // LocalResponsePlayback, p1

        // A completion from the torn-down listening pipeline arrives late.
        f.orch.dispatch(Event::StageStatusChanged {
            stage: old_sink,
            status: StageStatus::Stopped,
        });
        assert_eq!(f.orch.state.current, Activity::LocalResponsePlayback);
    }

    #[tokio::test]
    async fn non_sink_stage_completion_does_not_advance() {
        let mut config = AppConfig::default();
        config.media.idle_media = Some("/sdcard/boot.mp3".into());
        let mut f = fixture(config);
        f.orch.enter(Activity::Idle);

        let decoder = f
            .orch
            .state
            .pipeline
            .as_ref()
            .unwrap()
            .stage_id(StageRole::Decoder)
            .unwrap();
        f.orch.dispatch(Event::StageStatusChanged {
            stage: decoder,
            status: StageStatus::Finished,
        });
        assert_eq!(f.orch.state.current, Activity::Idle);
    }

    #[tokio::test]
    async fn sink_error_is_treated_as_completion() {
        let mut config = AppConfig::default();
        config.media.idle_media = Some("/sdcard/boot.mp3".into());
        let mut f = fixture(config);
        f.orch.enter(Activity::Idle);

        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Error,
        });
        assert_eq!(f.orch.state.current, Activity::Listening);
    }

    #[tokio::test]
    async fn decoder_stream_info_is_applied_to_the_sink() {
        let mut config = AppConfig::default();
        config.media.idle_media = Some("/sdcard/boot.mp3".into());
        let mut f = fixture(config);
        f.orch.enter(Activity::Idle);

        let decoder = f
            .orch
            .state
            .pipeline
            .as_ref()
            .unwrap()
            .stage_id(StageRole::Decoder)
            .unwrap();
        f.orch.dispatch(Event::StageInfoReported {
            stage: decoder,
            info: StreamInfo {
                sample_rate: 44_100,
                bit_depth: 16,
                channels: 2,
            },
        });

        assert_eq!(f.engine.trace.count("p0.set_clock(CodecSink,44100/16/2)"), 1);
        assert_eq!(f.orch.state.current, Activity::Idle, "no transition");
    }

    #[tokio::test]
    async fn build_failure_falls_back_to_quiescent_idle() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle); // Listening, p0
        f.engine.fail_builds_containing(StageRole::Decoder);

        f.engine.push_frame(vec![0; CHUNK]);
        f.detector.push_result(Ok(1));
        f.orch.listening_tick().await; // LocalResponsePlayback build fails

        assert_eq!(f.orch.state.current, Activity::Idle);
        assert!(f.orch.state.pipeline.is_none());
        let builds = f.engine.trace.count(".build");
        assert_eq!(builds, 1, "no retry after the failed build");
        assert_eq!(
            *f.display.patterns.lock().unwrap().last().unwrap(),
            DisplayPattern::Off
        );
    }

    #[tokio::test]
    async fn mode_long_press_restarts_pairing() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        f.orch
            .dispatch(Event::PeripheralLongPressed(ButtonId::Mode));
        assert_eq!(*f.provisioning.restarts.lock().unwrap(), 1);
        assert_eq!(f.orch.state.current, Activity::Listening, "state unchanged");

        f.orch.dispatch(Event::PeripheralPressed(ButtonId::Set));
        assert_eq!(*f.provisioning.restarts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn listening_tick_services_queued_events_first() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::Idle);

        f.tx.send(Event::PeripheralLongPressed(ButtonId::Mode));
        f.orch.listening_tick().await;

        assert_eq!(*f.provisioning.restarts.lock().unwrap(), 1);
        assert_eq!(f.orch.state.current, Activity::Listening);
    }

    #[tokio::test]
    async fn cloud_audio_returns_to_listening() {
        let mut f = fixture(AppConfig::default());
        f.orch.enter(Activity::CloudAudioPlayback);

        assert_eq!(f.orch.state.current, Activity::CloudAudioPlayback);
        assert_eq!(
            f.engine
                .trace
                .count("p0.set_uri(HttpSource,http://192.168.0.174/ai/media/stream.mp3)"),
            1
        );

        let sink = sink_stage(&f.orch);
        f.orch.dispatch(Event::StageStatusChanged {
            stage: sink,
            status: StageStatus::Finished,
        });
        assert_eq!(f.orch.state.current, Activity::Listening);
    }
}
