use serenity::model::id::{ChannelId, GuildId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

use super::VoiceGateway;
use crate::{
    error::BotResult,
    models::VoiceSessionInfo,
    registry::{SessionRegistry, VoiceSession},
};

/// Owns the lifecycle of the single voice connection each guild may have.
///
/// A session is never re-pointed at another channel: switching channels
/// tears the old connection down and opens a new one.
pub struct VoiceSessionManager {
    registry: Rc<RefCell<SessionRegistry>>,
    gateway: Rc<dyn VoiceGateway>,
}

impl VoiceSessionManager {
    pub fn new(registry: Rc<RefCell<SessionRegistry>>, gateway: Rc<dyn VoiceGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Connects to `channel_id`, replacing any session the guild already has.
    ///
    /// # Errors
    ///
    /// - `ChannelNotFound` / `NotVoiceCapable` when the channel can't be used
    /// - `ConnectionFailed` when the transport refuses the connection
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> BotResult<VoiceSessionInfo> {
        let channel = self.gateway.lookup_channel(guild_id, channel_id)?;

        // Desconectar la sesión anterior antes de abrir la nueva
        if self.teardown(guild_id).await {
            info!("🔁 Cambiando de canal en guild {}", guild_id);
        }

        let link = self.gateway.connect(guild_id, &channel).await?;
        let session = VoiceSession {
            guild_id,
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            link,
        };
        let info = session.info();

        // Otro join para la misma guild pudo terminar mientras esperábamos
        let replaced = {
            let mut registry = self.registry.borrow_mut();
            let replaced = registry.insert_session(session);
            if replaced.is_some() {
                if let Some(active) = registry.remove_slot(guild_id).and_then(|slot| slot.active) {
                    let _ = active.control.stop();
                }
            }
            replaced
        };
        if let Some(old) = replaced {
            warn!("⚠️ Join concurrente en guild {}, cerrando conexión anterior", guild_id);
            if let Err(e) = old.link.disconnect().await {
                warn!("Error al cerrar conexión reemplazada: {}", e);
            }
        }

        info!("🔊 Conectado a {} en guild {}", channel.name, guild_id);
        Ok(info)
    }

    /// Disconnects and forgets the guild's session and playback.
    ///
    /// Returns `false` when there was nothing to leave.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        let left = self.teardown(guild_id).await;
        if left {
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }
        left
    }

    pub fn get(&self, guild_id: GuildId) -> Option<VoiceSessionInfo> {
        self.registry.borrow().session(guild_id).map(VoiceSession::info)
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.registry
            .borrow()
            .session(guild_id)
            .is_some_and(|s| s.link.is_connected())
    }

    /// Channel of the guild's session, only while its transport is up.
    pub fn connected_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.registry
            .borrow()
            .session(guild_id)
            .filter(|s| s.link.is_connected())
            .map(|s| s.channel_id)
    }

    /// Drops sessions whose transport went away outside of [`leave`](Self::leave),
    /// e.g. the bot was kicked from the channel.
    pub fn sweep_stale(&self) -> usize {
        let mut registry = self.registry.borrow_mut();
        let stale = registry.stale_guilds();

        for guild_id in &stale {
            registry.remove_session(*guild_id);
            if let Some(active) = registry.remove_slot(*guild_id).and_then(|slot| slot.active) {
                let _ = active.control.stop();
            }
            info!("🧹 Limpiada conexión caída en guild {}", guild_id);
        }

        stale.len()
    }

    /// Removes session and playback for the guild, closing the transport if it is still up.
    async fn teardown(&self, guild_id: GuildId) -> bool {
        let (session, slot) = {
            let mut registry = self.registry.borrow_mut();
            (registry.remove_session(guild_id), registry.remove_slot(guild_id))
        };

        if let Some(active) = slot.and_then(|slot| slot.active) {
            if let Err(e) = active.control.stop() {
                warn!("Error al detener reproducción en guild {}: {}", guild_id, e);
            }
        }

        let Some(session) = session else {
            return false;
        };

        if session.link.is_connected() {
            if let Err(e) = session.link.disconnect().await {
                warn!("Error al desconectar en guild {}: {}", guild_id, e);
            }
        }
        true
    }
}
