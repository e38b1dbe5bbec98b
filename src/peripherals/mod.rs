//! Peripheral seams: buttons, display, provisioning.
//!
//! On the device these are GPIO lines, an LED bar and the Wi-Fi pairing
//! service. On a development host the button listener maps two keyboard keys
//! onto the logical buttons, and the display/provisioning seams fall back to
//! log-only implementations so the control core runs unmodified.

pub mod button;

pub use button::{parse_key, ButtonListener, ButtonTracker, PressKind};

// ---------------------------------------------------------------------------
// ButtonId
// ---------------------------------------------------------------------------

/// Logical identity of a physical button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    /// Mode button; a long press restarts network pairing.
    Mode,
    /// Set button; reserved, presses are logged only.
    Set,
}

impl ButtonId {
    pub fn label(&self) -> &'static str {
        match self {
            ButtonId::Mode => "mode",
            ButtonId::Set => "set",
        }
    }
}

// ---------------------------------------------------------------------------
// DisplayService
// ---------------------------------------------------------------------------

/// Indicator pattern shown for the current activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPattern {
    Off,
    Listening,
    Recording,
    Playing,
}

/// Activity indicator seam.
pub trait DisplayService: Send + Sync {
    fn set_pattern(&self, pattern: DisplayPattern);
}

/// Provisioning seam. `restart_pairing` re-enters network pairing mode.
pub trait ProvisioningService: Send + Sync {
    fn restart_pairing(&self);
}

// ---------------------------------------------------------------------------
// Host fallbacks
// ---------------------------------------------------------------------------

/// Log-only display for hosts without an indicator.
pub struct LogDisplay;

impl DisplayService for LogDisplay {
    fn set_pattern(&self, pattern: DisplayPattern) {
        log::info!("display: {:?}", pattern);
    }
}

/// Log-only provisioning for hosts without a pairing service.
pub struct LogProvisioner;

impl ProvisioningService for LogProvisioner {
    fn restart_pairing(&self) {
        log::warn!("provisioning: pairing restart requested (no-op on this host)");
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
