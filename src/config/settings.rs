//! Settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they round-trip through TOML files and can be shared across threads.
//! Defaults carry the device constants the firmware shipped with.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::activity::Activity;

use super::AppPaths;

// ---------------------------------------------------------------------------
// MediaConfig
// ---------------------------------------------------------------------------

/// Media sources for the playback activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// SD card mount point.
    pub sd_mount: String,

    /// Media played while idle (e.g. `"/sdcard/test.mp3"`).
    ///
    /// `None` makes the orchestrator skip idle playback entirely and advance
    /// straight to listening at boot.
    pub idle_media: Option<String>,

    /// Locally-stored acknowledgement clips; one is picked at random after
    /// each wake-word detection.
    pub response_clips: Vec<String>,

    /// URL of the cloud's spoken reply to the last speech upload.
    pub cloud_reply_url: String,

    /// URL for direct-selected cloud media playback.
    pub cloud_media_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            sd_mount: "/sdcard".into(),
            idle_media: None,
            response_clips: vec![
                "/spiffs/wake-ack-0.mp3".into(),
                "/spiffs/wake-ack-1.mp3".into(),
                "/spiffs/wake-ack-2.mp3".into(),
            ],
            cloud_reply_url: "http://192.168.0.174/ai/tts/output.mp3".into(),
            cloud_media_url: "http://192.168.0.174/ai/media/stream.mp3".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// UploadConfig
// ---------------------------------------------------------------------------

/// Speech-upload endpoint and the fixed PCM format announced to it.
///
/// The format values are device constants, not negotiated; they become the
/// `x-audio-*` headers on the chunked upload session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Speech endpoint URL.
    pub url: String,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Capture bit depth.
    pub bit_depth: u16,
    /// Capture channel count.
    pub channels: u16,
    /// Upper bound on how much of the server response body is read/logged.
    pub response_cap_bytes: usize,
    /// Whole-session timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.0.174/ai/speech/test2".into(),
            sample_rate: 16_000,
            bit_depth: 16,
            channels: 1,
            response_cap_bytes: 2_048,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// DetectConfig
// ---------------------------------------------------------------------------

/// Keyword-detection loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Keyword index that counts as the wake word. Single-keyword detection;
    /// the model may know more words but only this one triggers.
    pub keyword_index: usize,
    /// Peripheral poll timeout between detection frames, in milliseconds.
    /// Short, so a long-press interrupts the detection loop promptly.
    pub button_poll_ms: u64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            keyword_index: 1,
            button_poll_ms: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// ButtonConfig
// ---------------------------------------------------------------------------

/// Physical button bindings for a development host.
///
/// On the device these are GPIO lines; on a host the listener maps two keys
/// onto the logical mode/set buttons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// Key bound to the mode button (e.g. `"F9"`).
    pub mode_key: String,
    /// Key bound to the set button (e.g. `"F10"`).
    pub set_key: String,
    /// Hold time that turns a press into a long press, in milliseconds.
    pub long_press_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            mode_key: "F9".into(),
            set_key: "F10".into(),
            long_press_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Activity entered at boot. `Idle` (the default) auto-advances to
    /// listening when no idle media is configured.
    pub startup: Activity,
    /// Media sources.
    pub media: MediaConfig,
    /// Speech upload endpoint and PCM format.
    pub upload: UploadConfig,
    /// Detection loop tuning.
    pub detect: DetectConfig,
    /// Button bindings.
    pub button: ButtonConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to the platform-appropriate `settings.toml`, creating parent
    /// directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
