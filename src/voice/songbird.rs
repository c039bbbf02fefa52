use ::songbird::{
    events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent},
    input::HttpRequest,
    tracks::{Track, TrackHandle},
    Call, Songbird,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    cache::Cache,
    model::{
        channel::ChannelType,
        id::{ChannelId, GuildId},
    },
};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ChannelInfo, EndHook, TrackControl, TrackEnd, VoiceGateway, VoiceLink};
use crate::error::{BotError, BotResult};

/// Per-guild connection counter.
///
/// songbird keeps a single `Call` per guild, so a link that was replaced by a
/// newer join must not tear that shared call down when it is closed.
#[derive(Default)]
pub struct ConnectionEpochs {
    next: AtomicU64,
    current: DashMap<GuildId, u64>,
}

impl ConnectionEpochs {
    pub fn advance(&self, guild_id: GuildId) -> u64 {
        let epoch = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.current.insert(guild_id, epoch);
        epoch
    }

    pub fn is_current(&self, guild_id: GuildId, epoch: u64) -> bool {
        self.current.get(&guild_id).is_some_and(|e| *e == epoch)
    }

    /// Forgets the guild if `epoch` is still the latest. Returns whether it was.
    pub fn retire(&self, guild_id: GuildId, epoch: u64) -> bool {
        self.current
            .remove_if(&guild_id, |_, current| *current == epoch)
            .is_some()
    }
}

pub fn is_voice_capable(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Voice | ChannelType::Stage)
}

/// Production gateway: channels come from the serenity cache, connections from songbird.
pub struct SongbirdGateway {
    cache: Arc<Cache>,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    epochs: Arc<ConnectionEpochs>,
}

impl SongbirdGateway {
    pub fn new(cache: Arc<Cache>, manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            cache,
            manager,
            http,
            epochs: Arc::new(ConnectionEpochs::default()),
        }
    }
}

#[async_trait(?Send)]
impl VoiceGateway for SongbirdGateway {
    fn lookup_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> BotResult<ChannelInfo> {
        let guild = self
            .cache
            .guild(guild_id)
            .ok_or_else(|| BotError::ChannelNotFound(channel_id.to_string()))?;
        let channel = guild
            .channels
            .get(&channel_id)
            .ok_or_else(|| BotError::ChannelNotFound(channel_id.to_string()))?;

        if !is_voice_capable(channel.kind) {
            return Err(BotError::NotVoiceCapable(channel.name.clone()));
        }
        Ok(ChannelInfo {
            id: channel_id,
            name: channel.name.clone(),
        })
    }

    async fn connect(
        &self,
        guild_id: GuildId,
        channel: &ChannelInfo,
    ) -> BotResult<Rc<dyn VoiceLink>> {
        let epoch = self.epochs.advance(guild_id);
        debug!("Conectando a {} en guild {} (epoch {})", channel.name, guild_id, epoch);

        let call = match self.manager.join(guild_id, channel.id).await {
            Ok(call) => call,
            Err(e) => {
                // Un join fallido no debe dejar una llamada a medias
                if self.epochs.retire(guild_id, epoch) {
                    let _ = self.manager.remove(guild_id).await;
                }
                return Err(BotError::ConnectionFailed(e.to_string()));
            }
        };

        let state = Arc::new(LinkState {
            guild_id,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        });
        {
            let mut handler = call.lock().await;
            // Los handlers de un enlace anterior ya no aplican
            handler.remove_all_global_events();
            for event in [
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
                CoreEvent::DriverDisconnect,
            ] {
                handler.add_global_event(Event::Core(event), ConnectionWatcher(state.clone()));
            }
        }

        let link = SongbirdLink {
            guild_id,
            epoch,
            call,
            state,
            manager: self.manager.clone(),
            epochs: self.epochs.clone(),
            http: self.http.clone(),
        };
        Ok(Rc::new(link) as Rc<dyn VoiceLink>)
    }
}

struct LinkState {
    guild_id: GuildId,
    connected: AtomicBool,
    closed: AtomicBool,
}

/// Keeps the link's `connected` flag in step with the songbird driver.
struct ConnectionWatcher(Arc<LinkState>);

#[async_trait]
impl VoiceEventHandler for ConnectionWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let state = &self.0;
        if state.closed.load(Ordering::Acquire) {
            return None;
        }
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                state.connected.store(true, Ordering::Release);
                debug!("🔗 Driver de voz conectado en guild {}", state.guild_id);
            }
            EventContext::DriverDisconnect(info) => {
                state.connected.store(false, Ordering::Release);
                warn!(
                    "🔌 Driver de voz desconectado en guild {}: {:?}",
                    state.guild_id, info.reason
                );
            }
            _ => {}
        }
        None
    }
}

pub struct SongbirdLink {
    guild_id: GuildId,
    epoch: u64,
    call: Arc<Mutex<Call>>,
    state: Arc<LinkState>,
    manager: Arc<Songbird>,
    epochs: Arc<ConnectionEpochs>,
    http: reqwest::Client,
}

#[async_trait(?Send)]
impl VoiceLink for SongbirdLink {
    fn is_connected(&self) -> bool {
        !self.state.closed.load(Ordering::Acquire)
            && self.state.connected.load(Ordering::Acquire)
            && self.epochs.is_current(self.guild_id, self.epoch)
    }

    async fn disconnect(&self) -> BotResult<()> {
        self.state.closed.store(true, Ordering::Release);
        self.state.connected.store(false, Ordering::Release);

        if !self.epochs.retire(self.guild_id, self.epoch) {
            debug!(
                "Enlace reemplazado en guild {}, la llamada sigue en uso",
                self.guild_id
            );
            return Ok(());
        }

        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| BotError::ConnectionFailed(e.to_string()))
    }

    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        on_end: EndHook,
    ) -> BotResult<Rc<dyn TrackControl>> {
        let input = HttpRequest::new(self.http.clone(), stream_url.to_string());
        let handle = {
            let mut call = self.call.lock().await;
            call.play(Track::new(input.into()).volume(volume))
        };

        let notifier = TrackEndNotifier {
            fired: Arc::new(AtomicBool::new(false)),
            on_end,
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| BotError::ConnectionFailed(e.to_string()))?;
        }

        info!("🎧 Fuente iniciada en guild {}", self.guild_id);
        Ok(Rc::new(SongbirdTrack(handle)) as Rc<dyn TrackControl>)
    }
}

/// Forwards the first end or error of a track to its [`EndHook`].
#[derive(Clone)]
struct TrackEndNotifier {
    fired: Arc<AtomicBool>,
    on_end: EndHook,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return None;
        }

        let end = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    ::songbird::tracks::PlayMode::Errored(e) => Some(TrackEnd::Errored(format!("{e:?}"))),
                    _ => None,
                })
                .unwrap_or(TrackEnd::Finished),
            _ => TrackEnd::Finished,
        };
        (self.on_end)(end);
        None
    }
}

struct SongbirdTrack(TrackHandle);

fn control_error(e: impl std::fmt::Display) -> BotError {
    BotError::ConnectionFailed(e.to_string())
}

impl TrackControl for SongbirdTrack {
    fn pause(&self) -> BotResult<()> {
        self.0.pause().map_err(control_error)
    }

    fn resume(&self) -> BotResult<()> {
        self.0.play().map_err(control_error)
    }

    fn stop(&self) -> BotResult<()> {
        self.0.stop().map_err(control_error)
    }
}
