//! # Bot Module
//!
//! Discord gateway event handling.
//!
//! [`MusicBot`] implements serenity's [`EventHandler`]. It does not own any
//! voice state itself: it publishes readiness through the [`ReadySignal`]
//! and talks to the voice loop through the [`CommandBridge`] like every
//! other caller.
//!
//! - `ready`: publishes the bot identity, unblocking bridged requests
//! - `voice_state_update`: cleans up after the bot is kicked and leaves
//!   channels the bot has been left alone in (see [`presence`])
//!
//! [`ReadySignal`]: crate::bridge::ReadySignal

use serenity::{
    all::{Context, EventHandler, Ready, VoiceState},
    async_trait,
};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod presence;

use presence::VoiceChange;

use crate::bridge::{BotIdentity, CommandBridge};

pub struct MusicBot {
    bridge: CommandBridge,
    auto_leave_grace: Duration,
}

impl MusicBot {
    pub fn new(bridge: CommandBridge, auto_leave_grace: Duration) -> Self {
        Self {
            bridge,
            auto_leave_grace,
        }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let identity = BotIdentity {
            user_id: ready.user.id.get(),
            tag: ready.user.tag(),
        };
        if !self.bridge.ready().mark_ready(identity) {
            // Reconexión del gateway: la identidad ya estaba publicada
            debug!("Evento ready repetido, ignorado");
        }
    }

    /// Reacts to voice channel membership changes.
    ///
    /// Runs on the gateway's runtime, so nothing here waits on the voice loop:
    /// cleanup is submitted and the auto-leave runs in its own task.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        let change = presence::classify_update(
            new.user_id,
            bot_id,
            old.and_then(|state| state.channel_id),
            new.channel_id,
            || presence::cached_presences(&ctx.cache, guild_id),
        );
        let left_channel = match change {
            VoiceChange::Ignore => return,
            VoiceChange::BotDisconnected => {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                let submitted = self.bridge.submit(|core| async move {
                    core.sessions.sweep_stale();
                });
                if let Err(e) = submitted {
                    warn!("No se pudo limpiar la sesión de guild {}: {}", guild_id, e);
                }
                return;
            }
            VoiceChange::LeftAlone(channel) => channel,
        };

        info!(
            "🚪 Programando auto-desconexión por inactividad en guild {}",
            guild_id
        );
        let bridge = self.bridge.clone();
        let cache = ctx.cache.clone();
        let grace = self.auto_leave_grace;
        tokio::spawn(async move {
            let timeout = bridge.timeouts().connect;
            presence::leave_if_still_alone(
                grace,
                || {
                    let presences = presence::cached_presences(&cache, guild_id);
                    presence::lonely_channel(presences, bot_id) == Some(left_channel)
                },
                || async move {
                    bridge
                        .call(timeout, move |core| async move {
                            Ok(core.sessions.leave(guild_id).await)
                        })
                        .await
                },
            )
            .await;
        });
    }
}
