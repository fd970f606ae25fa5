//! Export pipeline: serialize a completed session to a durable artifact.
//!
//! The artifact is a single JSON document. When the host supplies a
//! destination path the document is written there; with no destination the
//! serialized document is handed back in memory for the caller to deliver.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use aft_core::error::{AftError, AftResult};
use aft_core::samples::{EmotionSample, GazeSample};
use aft_core::session::{Session, SessionSummary};

/// Default artifact file name, suggested under the documents directory.
pub const DEFAULT_EXPORT_FILE: &str = "emotion-data.json";

/// The export document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    /// Raw session start as epoch milliseconds; doubles as the session id.
    pub session_id: i64,
    /// Session start, ISO-8601.
    pub start_time: String,
    /// Export instant, ISO-8601.
    pub end_time: String,
    pub emotions: Vec<EmotionSample>,
    pub gaze_points: Vec<GazeSample>,
    pub summary: SessionSummary,
}

/// Build the export artifact for a session, closing it at `end`.
///
/// Fails with [`AftError::NoData`] when the session holds no samples of
/// either kind.
pub fn build_artifact(session: &Session, end: DateTime<Utc>) -> AftResult<ExportArtifact> {
    if session.is_empty() {
        return Err(AftError::NoData);
    }

    let start = session.start_time.unwrap_or(end);

    Ok(ExportArtifact {
        session_id: start.timestamp_millis(),
        start_time: start.to_rfc3339(),
        end_time: end.to_rfc3339(),
        emotions: session.emotion_samples.clone(),
        gaze_points: session.gaze_samples.clone(),
        summary: SessionSummary::compute(session, end),
    })
}

/// Serialize the session to an in-memory JSON document (the fallback when
/// no save destination is available).
pub fn export_blob(session: &Session) -> AftResult<String> {
    let artifact = build_artifact(session, Utc::now())?;
    Ok(serde_json::to_string_pretty(&artifact)?)
}

/// Serialize the session and write it to `path`. Parent directories are
/// created as needed. Returns the path written.
pub async fn export_to_path(session: &Session, path: &Path) -> AftResult<PathBuf> {
    let artifact = build_artifact(session, Utc::now())?;
    let json = serde_json::to_string_pretty(&artifact)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, json).await?;

    tracing::info!(
        path = %path.display(),
        gaze = artifact.summary.total_gaze_samples,
        emotion = artifact.summary.total_emotion_samples,
        "session exported"
    );
    Ok(path.to_path_buf())
}

/// Suggested destination: `emotion-data.json` under the platform documents
/// directory, falling back to the current directory.
pub fn default_export_path(documents_dir: Option<PathBuf>) -> PathBuf {
    documents_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_EXPORT_FILE)
}
