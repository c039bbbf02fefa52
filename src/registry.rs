//! Per-guild voice sessions and playback slots.
//!
//! Plain data with no I/O and no locking. The registry lives on the voice loop
//! thread behind an `Rc<RefCell<_>>`; every outside caller reaches it through
//! the command bridge. Borrows must never be held across an `.await`.

use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{PlaybackState, VoiceSessionInfo};
use crate::voice::{TrackControl, VoiceLink};

/// A live connection owned by the session manager.
pub struct VoiceSession {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub link: Rc<dyn VoiceLink>,
}

impl VoiceSession {
    pub fn info(&self) -> VoiceSessionInfo {
        VoiceSessionInfo {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            channel_name: self.channel_name.clone(),
            connected: self.link.is_connected(),
        }
    }
}

/// The transport source currently attached to a guild.
pub struct ActiveTrack {
    pub generation: u64,
    pub control: Rc<dyn TrackControl>,
}

/// Best-effort playback position, counted from the start instant minus paused time.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PlaybackClock {
    pub fn start(&mut self) {
        *self = Self {
            started: Some(Instant::now()),
            ..Self::default()
        };
    }

    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += at.elapsed();
        }
    }

    /// Freezes the clock; later reads keep returning the position reached.
    pub fn halt(&mut self) {
        self.pause();
    }

    pub fn position_secs(&self) -> u64 {
        let Some(started) = self.started else {
            return 0;
        };
        let end = self.paused_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
            .as_secs()
    }
}

/// Controller-owned playback record for one guild.
pub struct PlaybackSlot {
    pub state: PlaybackState,
    pub active: Option<ActiveTrack>,
    pub clock: PlaybackClock,
}

impl PlaybackSlot {
    pub fn new(volume: f32) -> Self {
        Self {
            state: PlaybackState::idle(volume),
            active: None,
            clock: PlaybackClock::default(),
        }
    }

    /// Copy of the state with the position refreshed from the clock.
    pub fn snapshot(&self) -> PlaybackState {
        let mut state = self.state.clone();
        state.position = self.clock.position_secs();
        state
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<GuildId, VoiceSession>,
    playback: HashMap<GuildId, PlaybackSlot>,
    generation: u64,
    requests: HashMap<GuildId, u64>,
    request_seq: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Sesiones de voz

    pub fn session(&self, guild_id: GuildId) -> Option<&VoiceSession> {
        self.sessions.get(&guild_id)
    }

    pub fn link(&self, guild_id: GuildId) -> Option<Rc<dyn VoiceLink>> {
        self.sessions.get(&guild_id).map(|s| s.link.clone())
    }

    /// Registers a session and hands back whatever it replaced.
    pub fn insert_session(&mut self, session: VoiceSession) -> Option<VoiceSession> {
        self.sessions.insert(session.guild_id, session)
    }

    pub fn remove_session(&mut self, guild_id: GuildId) -> Option<VoiceSession> {
        self.sessions.remove(&guild_id)
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Guilds whose transport reports it is no longer connected.
    pub fn stale_guilds(&self) -> Vec<GuildId> {
        self.sessions
            .iter()
            .filter(|(_, session)| !session.link.is_connected())
            .map(|(guild_id, _)| *guild_id)
            .collect()
    }

    // Estado de reproducción

    pub fn slot(&self, guild_id: GuildId) -> Option<&PlaybackSlot> {
        self.playback.get(&guild_id)
    }

    pub fn slot_mut(&mut self, guild_id: GuildId) -> Option<&mut PlaybackSlot> {
        self.playback.get_mut(&guild_id)
    }

    pub fn slot_or_insert(&mut self, guild_id: GuildId, volume: f32) -> &mut PlaybackSlot {
        self.playback
            .entry(guild_id)
            .or_insert_with(|| PlaybackSlot::new(volume))
    }

    pub fn remove_slot(&mut self, guild_id: GuildId) -> Option<PlaybackSlot> {
        self.playback.remove(&guild_id)
    }

    /// Generation numbers are unique for the life of the registry.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Marks a new `play` request as the guild's latest and returns its number.
    pub fn begin_request(&mut self, guild_id: GuildId) -> u64 {
        self.request_seq += 1;
        self.requests.insert(guild_id, self.request_seq);
        self.request_seq
    }

    /// Whether no newer `play` request has started for the guild since `request`.
    pub fn is_latest_request(&self, guild_id: GuildId, request: u64) -> bool {
        self.requests.get(&guild_id) == Some(&request)
    }
}
