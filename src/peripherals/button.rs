//! Keyboard-backed button listener using `rdev::listen`.
//!
//! `rdev::listen` is a blocking OS-level call that must live on its own
//! thread. [`ButtonListener`] owns that thread and a stop flag; dropping the
//! handle sets the flag so the callback silently discards further key events.
//! The thread itself stays blocked inside rdev until the process exits, as
//! rdev has no shutdown API; it holds no resources that need cleanup.
//!
//! Press classification happens on release: a key held at least the
//! configured long-press threshold becomes a long press, anything shorter a
//! short press. OS key auto-repeat delivers extra `KeyPress` events while a
//! key is held; [`ButtonTracker`] ignores them so the hold time is measured
//! from the first press.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crate::events::{Event, EventSender};

use super::ButtonId;

// ---------------------------------------------------------------------------
// ButtonTracker
// ---------------------------------------------------------------------------

/// Classification of one completed press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Short,
    Long,
}

/// Per-button hold-time tracker.
///
/// Pure state machine over `(key_down, key_up)` timestamps so classification
/// is testable without an OS event source.
pub struct ButtonTracker {
    long_press: Duration,
    held_since: Option<Instant>,
}

impl ButtonTracker {
    pub fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            held_since: None,
        }
    }

    /// Record a key-down. Repeats while already held are ignored.
    pub fn key_down(&mut self, now: Instant) {
        if self.held_since.is_none() {
            self.held_since = Some(now);
        }
    }

    /// Record a key-up and classify the completed press.
    ///
    /// Returns `None` for a release without a matching press (e.g. the key
    /// was already down when the listener started).
    pub fn key_up(&mut self, now: Instant) -> Option<PressKind> {
        let pressed_at = self.held_since.take()?;
        let held = now.saturating_duration_since(pressed_at);
        if held >= self.long_press {
            Some(PressKind::Long)
        } else {
            Some(PressKind::Short)
        }
    }
}

// ---------------------------------------------------------------------------
// ButtonListener
// ---------------------------------------------------------------------------

/// Handle to the running button listener thread.
///
/// Construct with [`ButtonListener::start`]; drop to stop forwarding events.
pub struct ButtonListener {
    /// Shared stop flag, set on [`Drop`].
    stop: Arc<AtomicBool>,
    /// Kept so the thread is not detached prematurely; never joined because
    /// `rdev::listen` never returns.
    _thread: std::thread::JoinHandle<()>,
}

impl ButtonListener {
    /// Spawn the listener thread.
    ///
    /// `bindings` maps keyboard keys onto logical buttons. Completed presses
    /// are forwarded on `tx` as [`Event::PeripheralPressed`] or
    /// [`Event::PeripheralLongPressed`] according to `long_press`.
    pub fn start(
        bindings: Vec<(rdev::Key, ButtonId)>,
        long_press: Duration,
        tx: EventSender,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("button-listener".into())
            .spawn(move || {
                let mut trackers: HashMap<rdev::Key, (ButtonId, ButtonTracker)> = bindings
                    .into_iter()
                    .map(|(key, id)| (key, (id, ButtonTracker::new(long_press))))
                    .collect();

                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }

                    match event.event_type {
                        rdev::EventType::KeyPress(k) => {
                            if let Some((_, tracker)) = trackers.get_mut(&k) {
                                tracker.key_down(Instant::now());
                            }
                        }
                        rdev::EventType::KeyRelease(k) => {
                            if let Some((id, tracker)) = trackers.get_mut(&k) {
                                match tracker.key_up(Instant::now()) {
                                    Some(PressKind::Short) => {
                                        tx.send(Event::PeripheralPressed(*id));
                                    }
                                    Some(PressKind::Long) => {
                                        tx.send(Event::PeripheralLongPressed(*id));
                                    }
                                    None => {}
                                }
                            }
                        }
                        _ => {}
                    }
                });

                if let Err(e) = result {
                    log::error!("button-listener: rdev::listen exited with error: {:?}", e);
                }
            })?;

        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for ButtonListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Parse a button binding from a config string into an [`rdev::Key`].
///
/// Supports F1-F12, common named keys and single ASCII letters. Returns
/// `None` for unrecognised names so callers can report the binding instead
/// of guessing.
pub fn parse_key(key_str: &str) -> Option<rdev::Key> {
    use rdev::Key;

    match key_str {
        "F1" => Some(Key::F1),
        "F2" => Some(Key::F2),
        "F3" => Some(Key::F3),
        "F4" => Some(Key::F4),
        "F5" => Some(Key::F5),
        "F6" => Some(Key::F6),
        "F7" => Some(Key::F7),
        "F8" => Some(Key::F8),
        "F9" => Some(Key::F9),
        "F10" => Some(Key::F10),
        "F11" => Some(Key::F11),
        "F12" => Some(Key::F12),

        "Escape" | "Esc" => Some(Key::Escape),
        "Space" => Some(Key::Space),
        "Return" | "Enter" => Some(Key::Return),
        "Tab" => Some(Key::Tab),
        "Home" => Some(Key::Home),
        "End" => Some(Key::End),
        "PageUp" => Some(Key::PageUp),
        "PageDown" => Some(Key::PageDown),

        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => letter_key(c.to_ascii_lowercase()),
                _ => None,
            }
        }
    }
}

fn letter_key(c: char) -> Option<rdev::Key> {
    use rdev::Key;

    Some(match c {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
