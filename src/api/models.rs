use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};

use crate::bridge::GuildStatus;
use crate::error::BotError;
use crate::models::{PlaybackState, PlaybackStatus, Track};

/// A Discord id as sent by clients: either a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RawId(serde_json::Value);

impl RawId {
    /// Parses a non-zero snowflake, naming `field` in the error.
    pub fn parse(&self, field: &str) -> Result<u64, ApiError> {
        let id = match &self.0 {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        parse_snowflake(id, field)
    }
}

/// Validates a snowflake taken from a path segment.
pub fn parse_path_id(raw: &str, field: &str) -> Result<u64, ApiError> {
    parse_snowflake(raw.trim().parse::<u64>().ok(), field)
}

fn parse_snowflake(id: Option<u64>, field: &str) -> Result<u64, ApiError> {
    match id {
        Some(id) if id != 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!("Invalid {field}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub guild_id: RawId,
    pub channel_id: RawId,
    pub url: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl PlayRequest {
    pub fn ids(&self) -> Result<(GuildId, ChannelId), ApiError> {
        Ok((
            GuildId::new(self.guild_id.parse("guild_id")?),
            ChannelId::new(self.channel_id.parse("channel_id")?),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub guild_id: RawId,
}

impl ControlRequest {
    pub fn guild(&self) -> Result<GuildId, ApiError> {
        Ok(GuildId::new(self.guild_id.parse("guild_id")?))
    }
}

/// Body of `/play` and `/stop`.
#[derive(Debug, Serialize, PartialEq)]
pub struct ActionResponse {
    pub success: bool,
    pub title: String,
    pub error: String,
}

impl ActionResponse {
    pub fn ok(title: impl Into<String>) -> Self {
        Self {
            success: true,
            title: title.into(),
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            title: String::new(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoiceConnectionView {
    pub guild_id: u64,
    pub channel_id: u64,
    pub channel_name: String,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct NowPlayingView {
    pub title: String,
    pub uploader: String,
    pub duration: u64,
    pub formatted_duration: String,
}

impl From<&Track> for NowPlayingView {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            uploader: track.uploader.clone(),
            duration: track.duration,
            formatted_duration: format_duration(track.duration),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub playback_state: PlaybackState,
    pub voice_connection: Option<VoiceConnectionView>,
    pub now_playing: Option<NowPlayingView>,
}

impl From<GuildStatus> for StatusResponse {
    fn from(status: GuildStatus) -> Self {
        let now_playing = status.playback.current_track.as_ref().map(NowPlayingView::from);
        let voice_connection = status.voice.map(|v| VoiceConnectionView {
            guild_id: v.guild_id.get(),
            channel_id: v.channel_id.get(),
            channel_name: v.channel_name,
            connected: v.connected,
        });
        Self {
            connected: status.connected,
            playback_state: status.playback,
            voice_connection,
            now_playing,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NowPlayingTrack {
    #[serde(flatten)]
    pub info: NowPlayingView,
    pub requester_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NowPlayingResponse {
    pub playing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PlaybackStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<NowPlayingTrack>,
    pub message: String,
}

impl From<PlaybackState> for NowPlayingResponse {
    fn from(state: PlaybackState) -> Self {
        match state.current_track {
            None => Self {
                playing: false,
                status: None,
                track: None,
                message: "No music currently playing".to_string(),
            },
            Some(track) => Self {
                playing: true,
                status: Some(state.status),
                message: format!("Now playing: {}", track.title),
                track: Some(NowPlayingTrack {
                    info: NowPlayingView::from(&track),
                    requester_id: track.requester_id,
                }),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub bot_ready: bool,
    pub bot_user: Option<String>,
}

/// `MM:SS`, minutes are not wrapped into hours.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Failure of a facade request, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Bot(BotError),
}

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        ApiError::Bot(e)
    }
}

pub fn status_for(error: &BotError) -> StatusCode {
    match error {
        BotError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        BotError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
        BotError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        BotError::NotVoiceCapable(_) => StatusCode::BAD_REQUEST,
        BotError::NotConnected | BotError::Superseded => StatusCode::CONFLICT,
        BotError::ResolutionError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BotError::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
        BotError::PlaybackFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Bot(e) => (status_for(&e), e.to_string()),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}
