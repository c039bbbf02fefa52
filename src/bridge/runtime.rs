use serenity::model::id::{ChannelId, GuildId};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Job;
use crate::{
    error::BotResult,
    models::{PlaybackState, Track, VoiceSessionInfo},
    playback::{Completion, PlaybackController},
    registry::SessionRegistry,
    sources::TrackResolver,
    voice::{VoiceGateway, VoiceSessionManager},
};

#[derive(Debug, Clone, Copy)]
pub struct CoreSettings {
    pub settle_delay: Duration,
    pub default_volume: f32,
}

/// Combined view of a guild's connection and playback.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildStatus {
    pub connected: bool,
    pub playback: PlaybackState,
    pub voice: Option<VoiceSessionInfo>,
}

/// Everything that must stay on the voice loop thread.
pub struct VoiceCore {
    pub sessions: VoiceSessionManager,
    pub playback: PlaybackController,
}

impl VoiceCore {
    /// Builds the core around a shared registry. The receiver carries
    /// transport end notices and belongs to the [`VoiceLoop`].
    pub fn new(
        gateway: Rc<dyn VoiceGateway>,
        resolver: Rc<dyn TrackResolver>,
        settings: CoreSettings,
    ) -> (Rc<Self>, mpsc::UnboundedReceiver<Completion>) {
        let registry = Rc::new(RefCell::new(SessionRegistry::new()));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let core = Self {
            sessions: VoiceSessionManager::new(registry.clone(), gateway),
            playback: PlaybackController::new(
                registry,
                resolver,
                completions_tx,
                settings.settle_delay,
                settings.default_volume,
            ),
        };
        (Rc::new(core), completions_rx)
    }

    /// Joins `channel_id` unless the guild is already connected there, then plays `url`.
    pub async fn play_in_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        url: String,
        requester_id: Option<String>,
    ) -> BotResult<Track> {
        if self.sessions.connected_channel(guild_id) != Some(channel_id) {
            self.sessions.join(guild_id, channel_id).await?;
        }
        self.playback.play(guild_id, &url, requester_id).await
    }

    pub fn status(&self, guild_id: GuildId) -> GuildStatus {
        GuildStatus {
            connected: self.sessions.is_connected(guild_id),
            playback: self.playback.state(guild_id),
            voice: self.sessions.get(guild_id),
        }
    }
}

/// Pump that owns the core: runs bridged jobs, applies completions and
/// periodically sweeps dropped connections.
pub struct VoiceLoop {
    core: Rc<VoiceCore>,
    jobs: mpsc::UnboundedReceiver<Job>,
    completions: mpsc::UnboundedReceiver<Completion>,
    sweep_interval: Option<Duration>,
    shutdown: CancellationToken,
}

impl VoiceLoop {
    pub fn new(
        core: Rc<VoiceCore>,
        jobs: mpsc::UnboundedReceiver<Job>,
        completions: mpsc::UnboundedReceiver<Completion>,
        sweep_interval: Option<Duration>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            core,
            jobs,
            completions,
            sweep_interval,
            shutdown,
        }
    }

    /// Runs until shutdown or until every bridge handle is dropped.
    ///
    /// Must be spawned on a `LocalSet`: each job becomes its own local task
    /// so a slow connect never blocks the others.
    pub async fn run(mut self) {
        let period = self.sweep_interval.unwrap_or(Duration::from_secs(60));
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sweeping = self.sweep_interval.is_some();

        info!("🔄 Bucle de voz iniciado");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("🛑 Bucle de voz detenido");
                    break;
                }
                Some(completion) = self.completions.recv() => {
                    self.core.playback.finish(completion);
                }
                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        info!("Todos los puentes cerrados, saliendo del bucle de voz");
                        break;
                    };
                    tokio::task::spawn_local(job(self.core.clone()));
                }
                _ = sweep.tick(), if sweeping => {
                    let removed = self.core.sessions.sweep_stale();
                    if removed > 0 {
                        debug!("🧹 Barrido periódico: {} conexiones caídas", removed);
                    }
                }
            }
        }
    }
}
