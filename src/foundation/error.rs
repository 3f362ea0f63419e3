pub type DriftloopResult<T> = Result<T, DriftloopError>;

#[derive(thiserror::Error, Debug)]
pub enum DriftloopError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DriftloopError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}
