use serenity::model::id::GuildId;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    error::{BotError, BotResult},
    models::{PlaybackState, PlaybackStatus, Track},
    registry::{ActiveTrack, SessionRegistry},
    sources::TrackResolver,
    voice::{EndHook, TrackEnd, VoiceLink},
};

/// Notice that a transport source ended, tagged with the generation it was started under.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub guild_id: GuildId,
    pub generation: u64,
    pub end: TrackEnd,
}

/// Drives one track per guild through `stopped → playing ⇄ paused → stopped`.
pub struct PlaybackController {
    registry: Rc<RefCell<SessionRegistry>>,
    resolver: Rc<dyn TrackResolver>,
    completions: mpsc::UnboundedSender<Completion>,
    settle_delay: Duration,
    default_volume: f32,
}

impl PlaybackController {
    pub fn new(
        registry: Rc<RefCell<SessionRegistry>>,
        resolver: Rc<dyn TrackResolver>,
        completions: mpsc::UnboundedSender<Completion>,
        settle_delay: Duration,
        default_volume: f32,
    ) -> Self {
        Self {
            registry,
            resolver,
            completions,
            settle_delay,
            default_volume,
        }
    }

    /// Resolves `url` and starts it, replacing whatever the guild was playing.
    ///
    /// The guild must already have a voice session (`NotConnected` otherwise).
    /// Any later failure comes back as `PlaybackFailed` wrapping its cause,
    /// and the previous state is kept when resolution fails.
    ///
    /// Requests for one guild win in arrival order: once a newer `play` has
    /// started, an older one still resolving gives up with `Superseded`
    /// instead of replacing the newer track.
    pub async fn play(
        &self,
        guild_id: GuildId,
        url: &str,
        requester_id: Option<String>,
    ) -> BotResult<Track> {
        if self.connected_link(guild_id).is_none() {
            return Err(BotError::NotConnected);
        }
        let request = self.registry.borrow_mut().begin_request(guild_id);

        let track = self
            .resolver
            .resolve(url, requester_id)
            .await
            .map_err(BotError::playback)?;

        // La sesión pudo cerrarse mientras se resolvía la URL
        let link = self
            .connected_link(guild_id)
            .ok_or_else(|| BotError::playback(BotError::NotConnected))?;

        self.ensure_latest(guild_id, request)?;
        if self.halt_active(guild_id) {
            // Dar tiempo al transporte a vaciar el buffer anterior
            tokio::time::sleep(self.settle_delay).await;
            self.ensure_latest(guild_id, request)?;
        }

        let generation = self.registry.borrow_mut().next_generation();
        let volume = self.volume_for(guild_id);
        let control = link
            .play(&track.stream_url, volume, self.end_hook(guild_id, generation))
            .await
            .map_err(|e| {
                error!("Error al iniciar reproducción en guild {}: {}", guild_id, e);
                BotError::playback(e)
            })?;

        let mut registry = self.registry.borrow_mut();
        let still_ours = registry
            .link(guild_id)
            .is_some_and(|current| same_link(&current, &link));
        if !still_ours {
            let _ = control.stop();
            return Err(BotError::playback(BotError::NotConnected));
        }
        if !registry.is_latest_request(guild_id, request) {
            let _ = control.stop();
            return Err(BotError::playback(BotError::Superseded));
        }

        let slot = registry.slot_or_insert(guild_id, self.default_volume);
        if let Some(previous) = slot.active.replace(ActiveTrack { generation, control }) {
            // Otro play llegó primero: gana el último
            debug!("Reemplazando pista concurrente en guild {}", guild_id);
            let _ = previous.control.stop();
        }
        slot.state.status = PlaybackStatus::Playing;
        slot.state.current_track = Some(track.clone());
        slot.clock.start();

        info!("▶️ Reproduciendo '{}' en guild {}", track.title, guild_id);
        Ok(track)
    }

    /// Stops the active source; the last track stays visible in the state.
    pub fn stop(&self, guild_id: GuildId) -> bool {
        let stopped = self.halt_active(guild_id);
        if stopped {
            info!("⏹️ Reproducción detenida en guild {}", guild_id);
        }
        stopped
    }

    pub fn pause(&self, guild_id: GuildId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(slot) = registry.slot_mut(guild_id) else {
            return false;
        };
        if slot.state.status != PlaybackStatus::Playing {
            return false;
        }
        let Some(active) = slot.active.as_ref() else {
            return false;
        };

        if let Err(e) = active.control.pause() {
            warn!("Error al pausar en guild {}: {}", guild_id, e);
            return false;
        }
        slot.state.status = PlaybackStatus::Paused;
        slot.clock.pause();
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        true
    }

    pub fn resume(&self, guild_id: GuildId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(slot) = registry.slot_mut(guild_id) else {
            return false;
        };
        if slot.state.status != PlaybackStatus::Paused {
            return false;
        }
        let Some(active) = slot.active.as_ref() else {
            return false;
        };

        if let Err(e) = active.control.resume() {
            warn!("Error al reanudar en guild {}: {}", guild_id, e);
            return false;
        }
        slot.state.status = PlaybackStatus::Playing;
        slot.clock.resume();
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        true
    }

    /// Owned snapshot of the guild's playback.
    pub fn state(&self, guild_id: GuildId) -> PlaybackState {
        let registry = self.registry.borrow();
        let mut state = registry
            .slot(guild_id)
            .map(|slot| slot.snapshot())
            .unwrap_or_else(|| PlaybackState::idle(self.default_volume));

        // Sin sesión viva no hay nada sonando, aunque el barrido no haya pasado aún
        let live = registry
            .link(guild_id)
            .is_some_and(|link| link.is_connected());
        if !live {
            state.status = PlaybackStatus::Stopped;
        }
        state
    }

    /// Applies a transport end notice. Notices from replaced or stopped
    /// sources carry an old generation and are ignored.
    pub fn finish(&self, completion: Completion) {
        let Completion {
            guild_id,
            generation,
            end,
        } = completion;

        let mut registry = self.registry.borrow_mut();
        let Some(slot) = registry.slot_mut(guild_id) else {
            return;
        };
        if slot.active.as_ref().map(|a| a.generation) != Some(generation) {
            debug!("Fin de pista obsoleto en guild {} (gen {})", guild_id, generation);
            return;
        }

        slot.active = None;
        slot.state.status = PlaybackStatus::Stopped;
        slot.clock.halt();

        let title = slot
            .state
            .current_track
            .as_ref()
            .map(|t| t.title.as_str())
            .unwrap_or("Unknown");
        match end {
            TrackEnd::Finished => info!("🎵 Terminó '{}' en guild {}", title, guild_id),
            TrackEnd::Errored(message) => {
                error!("❌ Error en pista '{}' en guild {}: {}", title, guild_id, message)
            }
        }
    }

    fn ensure_latest(&self, guild_id: GuildId, request: u64) -> BotResult<()> {
        if self.registry.borrow().is_latest_request(guild_id, request) {
            return Ok(());
        }
        debug!("Play superado por una petición más reciente en guild {}", guild_id);
        Err(BotError::playback(BotError::Superseded))
    }

    /// Stops and detaches the active source, if any.
    fn halt_active(&self, guild_id: GuildId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(slot) = registry.slot_mut(guild_id) else {
            return false;
        };
        if !slot.state.status.is_active() {
            return false;
        }

        if let Some(active) = slot.active.take() {
            if let Err(e) = active.control.stop() {
                warn!("Error al detener pista en guild {}: {}", guild_id, e);
            }
        }
        slot.state.status = PlaybackStatus::Stopped;
        slot.clock.halt();
        true
    }

    fn connected_link(&self, guild_id: GuildId) -> Option<Rc<dyn VoiceLink>> {
        self.registry
            .borrow()
            .link(guild_id)
            .filter(|link| link.is_connected())
    }

    fn volume_for(&self, guild_id: GuildId) -> f32 {
        self.registry
            .borrow()
            .slot(guild_id)
            .map(|slot| slot.state.volume)
            .unwrap_or(self.default_volume)
    }

    fn end_hook(&self, guild_id: GuildId, generation: u64) -> EndHook {
        let completions = self.completions.clone();
        Arc::new(move |end| {
            let _ = completions.send(Completion {
                guild_id,
                generation,
                end,
            });
        })
    }
}

fn same_link(a: &Rc<dyn VoiceLink>, b: &Rc<dyn VoiceLink>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
