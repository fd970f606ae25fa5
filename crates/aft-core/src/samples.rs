//! Decoded telemetry samples.
//!
//! A sample is immutable once constructed. The wire carries no timestamps,
//! so each sample is stamped at decode time from the host clock; because all
//! frames are decoded on a single consumer, append order equals
//! non-decreasing timestamp order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::messages::{EmotionReading, GazeReading};

/// A single gaze fix, normalized to the unit square.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl GazeSample {
    pub fn from_reading(reading: &GazeReading, timestamp: DateTime<Utc>) -> Self {
        Self {
            x: reading.gaze_x,
            y: reading.gaze_y,
            timestamp,
        }
    }
}

/// A single emotion classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSample {
    /// Primary emotion label.
    pub label: String,
    /// Per-label scores in `[0, 1]`.
    pub scores: HashMap<String, f64>,
    /// Confidence percentage in `[0, 100]` for the primary label.
    pub confidence: f64,
    pub face_detected: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl EmotionSample {
    /// Build a sample from a raw reading. When the worker omits
    /// `confidence`, it is derived as the highest score as a truncated
    /// percentage.
    pub fn from_reading(reading: &EmotionReading, timestamp: DateTime<Utc>) -> Self {
        let confidence = reading
            .confidence
            .unwrap_or_else(|| derive_confidence(&reading.emotion_scores));

        Self {
            label: reading.emotion.clone(),
            scores: reading.emotion_scores.clone(),
            confidence,
            face_detected: reading.face_detected,
            timestamp,
        }
    }
}

/// Confidence fallback: highest score, as a truncated percentage.
fn derive_confidence(scores: &HashMap<String, f64>) -> f64 {
    let max = scores.values().copied().fold(0.0_f64, f64::max);
    (max * 100.0).floor().clamp(0.0, 100.0)
}

/// A decoded telemetry sample of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingSample {
    Gaze(GazeSample),
    Emotion(EmotionSample),
}

impl TrackingSample {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TrackingSample::Gaze(s) => s.timestamp,
            TrackingSample::Emotion(s) => s.timestamp,
        }
    }
}
