//! Activity descriptor registry.
//!
//! An [`Activity`] is one mutually-exclusive audio behaviour the device can
//! run. Exactly one activity is current at any time — that invariant is owned
//! by the orchestrator; this module only *describes* activities.
//!
//! [`describe`] is pure and total: for every variant it returns the ordered
//! pipeline-stage topology and the successor activity entered when the
//! current one completes normally. The successor chain is:
//!
//! ```text
//! Idle ──▶ Listening ──detected──▶ LocalResponsePlayback ──▶ SpeechCapture
//!   ▲                                                              │
//!   └──────────────── CloudResponsePlayback ◀──────────────────────┘
//! ```
//!
//! `CloudAudioPlayback` sits outside the round trip: it is only reachable by
//! direct selection (e.g. a configured startup media stream) and returns to
//! `Listening` when it finishes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// The six mutually-exclusive audio activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    /// Quiescent / idle-media playback. With no idle media configured the
    /// orchestrator advances straight to `Listening` at boot.
    Idle,

    /// Wake-word listening: raw PCM frames are pulled from the capture chain
    /// and fed to the keyword detector one fixed-size frame at a time.
    Listening,

    /// Microphone capture streamed to the speech endpoint as a chunked
    /// upload while the pipeline runs.
    SpeechCapture,

    /// A short locally-stored acknowledgement clip played after detection.
    LocalResponsePlayback,

    /// Playback of the cloud's spoken reply to the last speech upload.
    CloudResponsePlayback,

    /// Direct-selected cloud media playback, outside the wake round trip.
    CloudAudioPlayback,
}

impl Activity {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Listening => "listening",
            Activity::SpeechCapture => "speech-capture",
            Activity::LocalResponsePlayback => "local-response",
            Activity::CloudResponsePlayback => "cloud-response",
            Activity::CloudAudioPlayback => "cloud-audio",
        }
    }
}

impl Default for Activity {
    fn default() -> Self {
        Activity::Idle
    }
}

// ---------------------------------------------------------------------------
// StageRole
// ---------------------------------------------------------------------------

/// Role of one stage inside a pipeline chain.
///
/// Roles are unique within a single activity's topology, so the lifecycle
/// manager addresses stages by role rather than by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    /// Microphone / codec capture source.
    CaptureSource,
    /// Local file source (SD card or internal flash).
    LocalSource,
    /// Streaming HTTP source.
    HttpSource,
    /// Sample-rate / channel conversion ahead of the raw tap.
    ResampleFilter,
    /// Compressed-audio decoder; reports [`crate::engine::StreamInfo`]
    /// once the stream header has been parsed.
    Decoder,
    /// PCM encoder ahead of the upload sink.
    Encoder,
    /// Raw PCM tap the listening loop reads fixed-size frames from.
    RawTap,
    /// Physical codec output sink.
    CodecSink,
    /// Chunked-upload sink driven by the streaming upload adapter.
    UploadSink,
}

// ---------------------------------------------------------------------------
// ActivityDescriptor
// ---------------------------------------------------------------------------

/// Static description of one activity: its stage topology (in chain order)
/// and the activity entered on normal completion.
#[derive(Debug)]
pub struct ActivityDescriptor {
    /// Ordered stage roles, source first, sink last. Empty for a pipeline-less
    /// activity (`Idle` without configured media).
    pub roles: &'static [StageRole],
    /// Activity entered when this one completes.
    pub successor: Activity,
}

impl ActivityDescriptor {
    /// The terminal stage whose `Stopped`/`Finished` status marks completion.
    pub fn sink_role(&self) -> Option<StageRole> {
        self.roles.last().copied()
    }

    /// The first stage, which carries the source URI when one is configured.
    pub fn source_role(&self) -> Option<StageRole> {
        self.roles.first().copied()
    }

    /// Whether this topology contains a decoder that will report stream info.
    pub fn has_decoder(&self) -> bool {
        self.roles.contains(&StageRole::Decoder)
    }
}

// ---------------------------------------------------------------------------
// describe
// ---------------------------------------------------------------------------

static IDLE: ActivityDescriptor = ActivityDescriptor {
    roles: &[StageRole::LocalSource, StageRole::Decoder, StageRole::CodecSink],
    successor: Activity::Listening,
};

static LISTENING: ActivityDescriptor = ActivityDescriptor {
    roles: &[
        StageRole::CaptureSource,
        StageRole::ResampleFilter,
        StageRole::RawTap,
    ],
    successor: Activity::LocalResponsePlayback,
};

static SPEECH_CAPTURE: ActivityDescriptor = ActivityDescriptor {
    roles: &[
        StageRole::CaptureSource,
        StageRole::Encoder,
        StageRole::UploadSink,
    ],
    successor: Activity::CloudResponsePlayback,
};

static LOCAL_RESPONSE: ActivityDescriptor = ActivityDescriptor {
    roles: &[StageRole::LocalSource, StageRole::Decoder, StageRole::CodecSink],
    successor: Activity::SpeechCapture,
};

static CLOUD_RESPONSE: ActivityDescriptor = ActivityDescriptor {
    roles: &[StageRole::HttpSource, StageRole::Decoder, StageRole::CodecSink],
    successor: Activity::Listening,
};

static CLOUD_AUDIO: ActivityDescriptor = ActivityDescriptor {
    roles: &[StageRole::HttpSource, StageRole::Decoder, StageRole::CodecSink],
    successor: Activity::Listening,
};

/// Look up the static descriptor for `activity`.
///
/// Pure and total: no side effects, no failure modes.
pub fn describe(activity: Activity) -> &'static ActivityDescriptor {
    match activity {
        Activity::Idle => &IDLE,
        Activity::Listening => &LISTENING,
        Activity::SpeechCapture => &SPEECH_CAPTURE,
        Activity::LocalResponsePlayback => &LOCAL_RESPONSE,
        Activity::CloudResponsePlayback => &CLOUD_RESPONSE,
        Activity::CloudAudioPlayback => &CLOUD_AUDIO,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Activity; 6] = [
        Activity::Idle,
        Activity::Listening,
        Activity::SpeechCapture,
        Activity::LocalResponsePlayback,
        Activity::CloudResponsePlayback,
        Activity::CloudAudioPlayback,
    ];

    #[test]
    fn successor_chain_matches_design() {
        assert_eq!(describe(Activity::Idle).successor, Activity::Listening);
        assert_eq!(
            describe(Activity::Listening).successor,
            Activity::LocalResponsePlayback
        );
        assert_eq!(
            describe(Activity::LocalResponsePlayback).successor,
            Activity::SpeechCapture
        );
        assert_eq!(
            describe(Activity::SpeechCapture).successor,
            Activity::CloudResponsePlayback
        );
        assert_eq!(
            describe(Activity::CloudResponsePlayback).successor,
            Activity::Listening
        );
        assert_eq!(
            describe(Activity::CloudAudioPlayback).successor,
            Activity::Listening
        );
    }

    #[test]
    fn every_activity_has_a_descriptor() {
        for a in ALL {
            // Must not panic; roles slice may be anything but the successor
            // must always be a different state than a self-loop into capture.
            let d = describe(a);
            assert_ne!(d.successor, a, "{a:?} must not succeed itself");
        }
    }

    #[test]
    fn playback_topologies_end_in_codec_sink() {
        for a in [
            Activity::Idle,
            Activity::LocalResponsePlayback,
            Activity::CloudResponsePlayback,
            Activity::CloudAudioPlayback,
        ] {
            assert_eq!(describe(a).sink_role(), Some(StageRole::CodecSink));
            assert!(describe(a).has_decoder());
        }
    }

    #[test]
    fn capture_topologies_start_at_the_microphone() {
        assert_eq!(
            describe(Activity::Listening).source_role(),
            Some(StageRole::CaptureSource)
        );
        assert_eq!(
            describe(Activity::SpeechCapture).source_role(),
            Some(StageRole::CaptureSource)
        );
        assert_eq!(
            describe(Activity::Listening).sink_role(),
            Some(StageRole::RawTap)
        );
        assert_eq!(
            describe(Activity::SpeechCapture).sink_role(),
            Some(StageRole::UploadSink)
        );
    }

    #[test]
    fn no_topology_contains_duplicate_roles() {
        for a in ALL {
            let roles = describe(a).roles;
            for (i, r) in roles.iter().enumerate() {
                assert!(
                    !roles[i + 1..].contains(r),
                    "{a:?} topology repeats {r:?}"
                );
            }
        }
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(Activity::Listening.label(), "listening");
        assert_eq!(Activity::SpeechCapture.label(), "speech-capture");
    }
}
