use thiserror::Error;

/// Failures surfaced by the voice core and the command bridge.
///
/// Every variant is recoverable by the caller; none of them is fatal to the
/// process. The facade decides how each one maps to a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BotError {
    #[error("Channel {0} not found")]
    ChannelNotFound(String),

    #[error("Channel {0} is not a voice channel")]
    NotVoiceCapable(String),

    #[error("Voice connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected to voice channel")]
    NotConnected,

    #[error("Failed to process URL: {0}")]
    ResolutionError(String),

    #[error("Failed to play music: {0}")]
    PlaybackFailed(Box<BotError>),

    #[error("Superseded by a newer play request")]
    Superseded,

    #[error("Bot not ready: {0}")]
    NotReady(String),

    #[error("Request timeout after {0:?}")]
    RequestTimeout(std::time::Duration),
}

impl BotError {
    /// Wraps a failure that happened after `play` accepted the request.
    pub fn playback(cause: BotError) -> Self {
        match cause {
            // Evitar anidar PlaybackFailed dentro de sí mismo
            already @ BotError::PlaybackFailed(_) => already,
            other => BotError::PlaybackFailed(Box::new(other)),
        }
    }

    /// Errors raised by the bridge itself rather than by the voice core.
    pub fn is_bridge_failure(&self) -> bool {
        matches!(self, BotError::NotReady(_) | BotError::RequestTimeout(_))
    }
}

pub type BotResult<T> = Result<T, BotError>;
