//! Consumed interface of the wake-word keyword detector.
//!
//! The model itself is a black box: a classifier over fixed-size 16-bit mono
//! PCM frames with its own opaque internal buffering. This crate only calls
//! it once per frame from the listening loop and reads back a keyword index
//! (0 = nothing). The per-keyword confidence threshold is applied inside the
//! model; [`KeywordDetector::threshold`] exists for the boot banner.

use thiserror::Error;

// ---------------------------------------------------------------------------
// DetectError
// ---------------------------------------------------------------------------

/// Errors surfaced by the detector seam.
#[derive(Debug, Clone, Error)]
pub enum DetectError {
    /// The model rejected the frame or failed internally.
    #[error("keyword model failure: {0}")]
    Model(String),
}

// ---------------------------------------------------------------------------
// KeywordDetector
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface over the keyword model.
///
/// # Contract
///
/// - `frame` is exactly [`chunk_size`](Self::chunk_size) samples of 16-bit
///   mono PCM at [`sample_rate`](Self::sample_rate) Hz.
/// - `detect` is stateless across frames apart from the model's own opaque
///   buffering; it returns the matched keyword index, or 0 for none.
pub trait KeywordDetector: Send + Sync {
    /// Classify one frame. Returns the keyword index, 0 when nothing matched.
    fn detect(&self, frame: &[i16]) -> Result<usize, DetectError>;

    /// PCM sample rate the model expects.
    fn sample_rate(&self) -> u32;

    /// Samples per frame. Must be non-zero; validated fatally at startup.
    fn chunk_size(&self) -> usize;

    /// Confidence threshold baked into the model for `index`.
    fn threshold(&self, index: usize) -> f32;

    /// Human-readable name of keyword `index`, if the model knows it.
    fn word_name(&self, index: usize) -> Option<String>;

    /// Number of keywords the model was trained on.
    fn word_count(&self) -> usize;
}

// Compile-time assertion: the trait must remain object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn KeywordDetector>) {}
};

// ---------------------------------------------------------------------------
// MockDetector  (test-only)
// ---------------------------------------------------------------------------

/// Scripted detector double: returns a queued result per frame, then 0.
#[cfg(test)]
pub struct MockDetector {
    results: std::sync::Mutex<std::collections::VecDeque<Result<usize, DetectError>>>,
    chunk_size: usize,
}

#[cfg(test)]
impl MockDetector {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            results: std::sync::Mutex::new(std::collections::VecDeque::new()),
            chunk_size,
        }
    }

    /// Queue the result for the next `detect` call.
    pub fn push_result(&self, result: Result<usize, DetectError>) {
        self.results.lock().unwrap().push_back(result);
    }
}

#[cfg(test)]
impl KeywordDetector for MockDetector {
    fn detect(&self, frame: &[i16]) -> Result<usize, DetectError> {
        assert_eq!(
            frame.len(),
            self.chunk_size,
            "detector fed a frame of the wrong size"
        );
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(0))
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn threshold(&self, _index: usize) -> f32 {
        0.9
    }

    fn word_name(&self, index: usize) -> Option<String> {
        (index == 1).then(|| "nihaoxiaozhi".to_string())
    }

    fn word_count(&self) -> usize {
        1
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
