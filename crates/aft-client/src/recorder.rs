//! In-memory session recorder.
//!
//! Append-only while a session is live; reset on the next session start.
//! Appends are O(1) amortized `Vec` pushes. There is no size cap — a
//! session is bounded only by its duration — so crossing a high-water mark
//! logs a one-time warning instead of silently growing.

use chrono::{DateTime, Utc};

use aft_core::samples::{EmotionSample, GazeSample};
use aft_core::session::Session;

/// Default high-water mark before the unbounded-growth warning fires.
const HIGH_WATER_SAMPLES: usize = 1_000_000;

/// Append-only buffer for the current session's samples.
#[derive(Debug)]
pub struct SessionRecorder {
    session: Session,
    high_water: usize,
    high_water_warned: bool,
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::with_high_water(HIGH_WATER_SAMPLES)
    }
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder with a custom high-water mark.
    pub fn with_high_water(high_water: usize) -> Self {
        Self {
            session: Session::default(),
            high_water,
            high_water_warned: false,
        }
    }

    /// Discard any previous session and begin a fresh one at `start`.
    pub fn reset(&mut self, start: DateTime<Utc>) {
        self.session = Session::started_at(start);
        self.high_water_warned = false;
    }

    pub fn record_gaze(&mut self, sample: GazeSample) {
        self.session.gaze_samples.push(sample);
        self.check_high_water();
    }

    pub fn record_emotion(&mut self, sample: EmotionSample) {
        self.session.emotion_samples.push(sample);
        self.check_high_water();
    }

    /// The current session (live or frozen).
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn check_high_water(&mut self) {
        if !self.high_water_warned && self.session.sample_count() >= self.high_water {
            self.high_water_warned = true;
            tracing::warn!(
                samples = self.session.sample_count(),
                "session buffer passed high-water mark; memory grows unbounded until stop"
            );
        }
    }
}
