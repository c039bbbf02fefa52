use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId};

/// A resolved, playable item. Never mutated after the resolver builds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub title: String,
    pub uploader: String,
    /// Duración en segundos
    pub duration: u64,
    /// URL tal como la envió el cliente
    pub url: String,
    /// URL directa del stream de audio
    #[serde(skip_serializing)]
    pub stream_url: String,
    pub requester_id: Option<String>,
    pub track_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    /// `true` while a transport source is attached (playing or paused).
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackStatus::Stopped)
    }
}

/// Snapshot of one guild's playback.
///
/// `status` is `playing` or `paused` only while `current_track` is set. A
/// stopped state may still carry the last track so it stays queryable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current_track: Option<Track>,
    /// Posición aproximada en segundos
    pub position: u64,
    pub volume: f32,
}

impl PlaybackState {
    pub fn idle(volume: f32) -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            current_track: None,
            position: 0,
            volume,
        }
    }
}

/// Public view of a voice connection; the transport handle stays in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSessionInfo {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub connected: bool,
}
