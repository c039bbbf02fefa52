//! # Voice Module
//!
//! Voice connections per guild and the transport seam underneath them.
//!
//! - [`manager`]: the [`VoiceSessionManager`], the only writer of voice sessions
//! - [`songbird`]: the production transport, backed by songbird and the serenity cache
//!
//! The traits below are the only thing the rest of the crate knows about the
//! transport. They run on the voice loop thread, so none of them require `Send`.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::BotResult;

pub mod manager;
pub mod songbird;

pub use manager::VoiceSessionManager;

/// A voice-capable channel as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
}

/// How a transport source came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEnd {
    Finished,
    Errored(String),
}

/// Completion callback handed to the transport. It may be called more than
/// once (end and error both fire on some failures) and from any thread.
pub type EndHook = Arc<dyn Fn(TrackEnd) + Send + Sync>;

/// Resolves channels and opens voice links.
#[async_trait(?Send)]
pub trait VoiceGateway {
    /// Fails with `ChannelNotFound` or `NotVoiceCapable`.
    fn lookup_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> BotResult<ChannelInfo>;

    /// Fails with `ConnectionFailed`.
    async fn connect(&self, guild_id: GuildId, channel: &ChannelInfo)
        -> BotResult<Rc<dyn VoiceLink>>;
}

/// One live connection to a voice channel.
#[async_trait(?Send)]
pub trait VoiceLink {
    fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> BotResult<()>;

    /// Starts streaming `stream_url`; `on_end` fires when the source finishes or fails.
    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        on_end: EndHook,
    ) -> BotResult<Rc<dyn TrackControl>>;
}

/// Control surface of one playing source.
pub trait TrackControl {
    fn pause(&self) -> BotResult<()>;
    fn resume(&self) -> BotResult<()>;
    fn stop(&self) -> BotResult<()>;
}
