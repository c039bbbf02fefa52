use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::BotResult;

/// A voice state reduced to what the auto-leave rule looks at.
#[derive(Debug, Clone, Copy)]
pub struct Presence {
    pub user_id: UserId,
    pub channel_id: Option<ChannelId>,
    pub is_bot: bool,
}

/// Channel the bot is sitting in when no human shares it.
pub fn lonely_channel(
    presences: impl IntoIterator<Item = Presence> + Clone,
    bot_id: UserId,
) -> Option<ChannelId> {
    let channel = presences
        .clone()
        .into_iter()
        .find(|p| p.user_id == bot_id)
        .and_then(|p| p.channel_id)?;

    let has_company = presences
        .into_iter()
        .any(|p| p.user_id != bot_id && p.channel_id == Some(channel) && !p.is_bot);
    (!has_company).then_some(channel)
}

/// What a voice state update asks the bot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceChange {
    /// The bot itself was disconnected from voice.
    BotDisconnected,
    /// A member left the channel and the bot is now alone in it.
    LeftAlone(ChannelId),
    Ignore,
}

/// Classifies a voice state update for `user_id` moving from `old_channel`
/// to `new_channel`. `presences` is only read when a member left a channel.
pub fn classify_update<P>(
    user_id: UserId,
    bot_id: UserId,
    old_channel: Option<ChannelId>,
    new_channel: Option<ChannelId>,
    presences: impl FnOnce() -> P,
) -> VoiceChange
where
    P: IntoIterator<Item = Presence> + Clone,
{
    if user_id == bot_id {
        return match new_channel {
            None => VoiceChange::BotDisconnected,
            Some(_) => VoiceChange::Ignore,
        };
    }

    // Solo interesa alguien que salió de un canal
    let Some(left_channel) = old_channel else {
        return VoiceChange::Ignore;
    };
    if new_channel == Some(left_channel) {
        return VoiceChange::Ignore;
    }

    match lonely_channel(presences(), bot_id) {
        Some(channel) if channel == left_channel => VoiceChange::LeftAlone(channel),
        _ => VoiceChange::Ignore,
    }
}

/// Voice presences of a guild, read from the serenity cache.
pub fn cached_presences(cache: &Cache, guild_id: GuildId) -> Vec<Presence> {
    let Some(guild) = cache.guild(guild_id) else {
        return Vec::new();
    };

    guild
        .voice_states
        .values()
        .map(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|m| m.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot))
                .unwrap_or(false);
            Presence {
                user_id: state.user_id,
                channel_id: state.channel_id,
                is_bot,
            }
        })
        .collect()
}

/// Waits out the grace period and leaves only if the bot is still alone.
///
/// Returns whether a leave was performed.
pub async fn leave_if_still_alone<C, L, Fut>(grace: Duration, still_alone: C, leave: L) -> bool
where
    C: Fn() -> bool,
    L: FnOnce() -> Fut,
    Fut: Future<Output = BotResult<bool>>,
{
    tokio::time::sleep(grace).await;

    if !still_alone() {
        debug!("Alguien volvió al canal, se cancela la auto-desconexión");
        return false;
    }

    match leave().await {
        Ok(left) => {
            if left {
                info!("🚪 Auto-desconexión: el bot quedó solo en el canal");
            }
            left
        }
        Err(e) => {
            warn!("Error en auto-desconexión: {}", e);
            false
        }
    }
}
