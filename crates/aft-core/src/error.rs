use thiserror::Error;

/// Errors produced by the aft telemetry layer.
#[derive(Debug, Error)]
pub enum AftError {
    #[error("worker spawn failed: {0}")]
    SpawnFailure(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("channel not open")]
    ChannelNotOpen,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("no session data to export")]
    NoData,

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AftError {
    fn from(e: serde_json::Error) -> Self {
        AftError::Serialize(e.to_string())
    }
}

pub type AftResult<T> = Result<T, AftError>;
