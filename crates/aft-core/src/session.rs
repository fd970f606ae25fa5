//! Session data model and derived summary.
//!
//! A session is one bounded tracking interval's accumulated samples, from
//! start command to stop command. Samples are stored in append order, which
//! equals non-decreasing timestamp order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::samples::{EmotionSample, GazeSample};

/// Accumulated samples for one tracking interval.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub start_time: Option<DateTime<Utc>>,
    pub gaze_samples: Vec<GazeSample>,
    pub emotion_samples: Vec<EmotionSample>,
}

impl Session {
    /// A fresh, empty session starting now.
    pub fn started_at(start: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start),
            gaze_samples: Vec::new(),
            emotion_samples: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gaze_samples.is_empty() && self.emotion_samples.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.gaze_samples.len() + self.emotion_samples.len()
    }
}

/// Summary derived from a session at export time. Not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub primary_emotion: String,
    pub emotion_counts: BTreeMap<String, u64>,
    pub total_emotion_samples: u64,
    pub total_gaze_samples: u64,
    pub session_duration_ms: i64,
}

impl SessionSummary {
    /// Compute the summary for a session, with `end` as the closing instant.
    ///
    /// The primary emotion is the label with the highest occurrence count;
    /// ties go to the label seen first. A session with no emotion samples
    /// reports "neutral". The "unknown" label is folded into "neutral"
    /// before counting.
    pub fn compute(session: &Session, end: DateTime<Utc>) -> Self {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        // Labels in first-seen order, for deterministic tie-breaking.
        let mut seen_order: Vec<String> = Vec::new();

        for sample in &session.emotion_samples {
            let label = normalize_label(&sample.label);
            if !counts.contains_key(label) {
                seen_order.push(label.to_string());
            }
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }

        // Strictly-greater comparison over first-seen order: ties keep the
        // earlier label.
        let mut primary: Option<(&str, u64)> = None;
        for label in &seen_order {
            let count = counts[label.as_str()];
            if primary.map_or(true, |(_, best)| count > best) {
                primary = Some((label, count));
            }
        }
        let primary_emotion = primary
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| "neutral".to_string());

        let session_duration_ms = session
            .start_time
            .map(|start| (end - start).num_milliseconds())
            .unwrap_or(0);

        Self {
            primary_emotion,
            total_emotion_samples: session.emotion_samples.len() as u64,
            total_gaze_samples: session.gaze_samples.len() as u64,
            emotion_counts: counts,
            session_duration_ms,
        }
    }

    /// Human-readable summary block, printed by the host when a session
    /// stops.
    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Session duration: {:.1}s",
            self.session_duration_ms as f64 / 1000.0
        ));
        lines.push(format!("Dominant emotion: {}", self.primary_emotion));
        lines.push(format!(
            "Samples: {} emotion, {} gaze",
            self.total_emotion_samples, self.total_gaze_samples
        ));

        if !self.emotion_counts.is_empty() {
            lines.push("Emotion breakdown:".to_string());
            let total: u64 = self.emotion_counts.values().sum();
            let mut ranked: Vec<(&String, &u64)> = self.emotion_counts.iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (label, count) in ranked {
                let pct = *count as f64 / total as f64 * 100.0;
                lines.push(format!("  {label}: {pct:.1}%"));
            }
        }

        lines.join("\n")
    }
}

fn normalize_label(label: &str) -> &str {
    if label == "unknown" {
        "neutral"
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn emotion(label: &str, ms: i64) -> EmotionSample {
        EmotionSample {
            label: label.to_string(),
            scores: HashMap::new(),
            confidence: 50.0,
            face_detected: true,
            timestamp: at(ms),
        }
    }

    fn gaze(ms: i64) -> GazeSample {
        GazeSample {
            x: 0.5,
            y: 0.5,
            timestamp: at(ms),
        }
    }

    #[test]
    fn empty_session_summary_is_neutral() {
        let session = Session::started_at(at(0));
        let summary = SessionSummary::compute(&session, at(5_000));
        assert_eq!(summary.primary_emotion, "neutral");
        assert_eq!(summary.total_emotion_samples, 0);
        assert_eq!(summary.total_gaze_samples, 0);
        assert_eq!(summary.session_duration_ms, 5_000);
        assert!(summary.emotion_counts.is_empty());
    }

    #[test]
    fn primary_emotion_is_highest_count() {
        let mut session = Session::started_at(at(0));
        for (label, ms) in [("sad", 1), ("happy", 2), ("happy", 3), ("sad", 4), ("happy", 5)] {
            session.emotion_samples.push(emotion(label, ms));
        }
        let summary = SessionSummary::compute(&session, at(10));
        assert_eq!(summary.primary_emotion, "happy");
        assert_eq!(summary.emotion_counts["happy"], 3);
        assert_eq!(summary.emotion_counts["sad"], 2);
    }

    #[test]
    fn primary_emotion_tie_goes_to_first_seen() {
        let mut session = Session::started_at(at(0));
        for (label, ms) in [
            ("happy", 1),
            ("sad", 2),
            ("sad", 3),
            ("happy", 4),
            ("sad", 5),
            ("happy", 6),
        ] {
            session.emotion_samples.push(emotion(label, ms));
        }
        let summary = SessionSummary::compute(&session, at(10));
        // happy:3, sad:3 — happy was seen first.
        assert_eq!(summary.primary_emotion, "happy");
    }

    #[test]
    fn unknown_label_folds_into_neutral() {
        let mut session = Session::started_at(at(0));
        session.emotion_samples.push(emotion("unknown", 1));
        session.emotion_samples.push(emotion("unknown", 2));
        session.emotion_samples.push(emotion("happy", 3));
        let summary = SessionSummary::compute(&session, at(10));
        assert_eq!(summary.primary_emotion, "neutral");
        assert_eq!(summary.emotion_counts["neutral"], 2);
        assert!(!summary.emotion_counts.contains_key("unknown"));
    }

    #[test]
    fn totals_match_sample_counts() {
        let mut session = Session::started_at(at(0));
        session.gaze_samples.push(gaze(1));
        session.gaze_samples.push(gaze(2));
        session.emotion_samples.push(emotion("happy", 3));
        let summary = SessionSummary::compute(&session, at(10));
        assert_eq!(summary.total_gaze_samples, 2);
        assert_eq!(summary.total_emotion_samples, 1);
    }

    #[test]
    fn render_text_mentions_dominant_emotion() {
        let mut session = Session::started_at(at(0));
        session.emotion_samples.push(emotion("happy", 1));
        let summary = SessionSummary::compute(&session, at(2_500));
        let text = summary.render_text();
        assert!(text.contains("Dominant emotion: happy"));
        assert!(text.contains("2.5s"));
        assert!(text.contains("happy: 100.0%"));
    }

    #[test]
    fn summary_serializes_camel_case() {
        let session = Session::started_at(at(0));
        let summary = SessionSummary::compute(&session, at(1));
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("primaryEmotion").is_some());
        assert!(json.get("sessionDurationMs").is_some());
        assert!(json.get("totalGazeSamples").is_some());
    }
}
