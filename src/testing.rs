//! In-memory transport used by the unit tests.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{BotError, BotResult};
use crate::models::Track;
use crate::sources::track_id;
use crate::voice::{ChannelInfo, EndHook, TrackControl, TrackEnd, VoiceGateway, VoiceLink};

pub fn track(title: &str, url: &str, duration: u64) -> Track {
    Track {
        title: title.to_string(),
        uploader: "Unknown".to_string(),
        duration,
        url: url.to_string(),
        stream_url: format!("{url}/stream"),
        requester_id: None,
        track_id: track_id(url, None),
    }
}

#[derive(Default)]
pub struct FakeGateway {
    channels: RefCell<HashMap<ChannelId, (String, bool)>>,
    links: RefCell<Vec<Rc<FakeLink>>>,
    fail_connect: Cell<bool>,
    connect_delay: Cell<Option<Duration>>,
}

impl FakeGateway {
    pub fn with_voice_channels(channels: &[(u64, &str)]) -> Rc<Self> {
        let gateway = Self::default();
        for (id, name) in channels {
            gateway
                .channels
                .borrow_mut()
                .insert(ChannelId::new(*id), (name.to_string(), true));
        }
        Rc::new(gateway)
    }

    pub fn add_text_channel(&self, id: u64, name: &str) {
        self.channels
            .borrow_mut()
            .insert(ChannelId::new(id), (name.to_string(), false));
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.set(fail);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay.set(Some(delay));
    }

    pub fn links(&self) -> Vec<Rc<FakeLink>> {
        self.links.borrow().clone()
    }

    pub fn last_link(&self) -> Rc<FakeLink> {
        self.links.borrow().last().cloned().expect("no link opened")
    }
}

#[async_trait(?Send)]
impl VoiceGateway for FakeGateway {
    fn lookup_channel(&self, _guild_id: GuildId, channel_id: ChannelId) -> BotResult<ChannelInfo> {
        match self.channels.borrow().get(&channel_id) {
            None => Err(BotError::ChannelNotFound(channel_id.to_string())),
            Some((name, false)) => Err(BotError::NotVoiceCapable(name.clone())),
            Some((name, true)) => Ok(ChannelInfo {
                id: channel_id,
                name: name.clone(),
            }),
        }
    }

    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel: &ChannelInfo,
    ) -> BotResult<Rc<dyn VoiceLink>> {
        if let Some(delay) = self.connect_delay.get() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.get() {
            return Err(BotError::ConnectionFailed("gateway refused".into()));
        }
        let link = FakeLink::new();
        self.links.borrow_mut().push(link.clone());
        Ok(link as Rc<dyn VoiceLink>)
    }
}

pub struct FakeLink {
    connected: Cell<bool>,
    disconnects: Cell<u32>,
    fail_play: Cell<bool>,
    overlapping_starts: Cell<u32>,
    tracks: RefCell<Vec<Rc<FakeTrack>>>,
}

impl FakeLink {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            connected: Cell::new(true),
            disconnects: Cell::new(0),
            fail_play: Cell::new(false),
            overlapping_starts: Cell::new(0),
            tracks: RefCell::new(Vec::new()),
        })
    }

    /// Simula que la plataforma cortó la conexión.
    pub fn drop_connection(&self) {
        self.connected.set(false);
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.get()
    }

    pub fn fail_play(&self, fail: bool) {
        self.fail_play.set(fail);
    }

    /// Times a source was started while another one was still live.
    pub fn overlapping_starts(&self) -> u32 {
        self.overlapping_starts.get()
    }

    pub fn tracks(&self) -> Vec<Rc<FakeTrack>> {
        self.tracks.borrow().clone()
    }

    pub fn last_track(&self) -> Rc<FakeTrack> {
        self.tracks.borrow().last().cloned().expect("no track started")
    }
}

#[async_trait(?Send)]
impl VoiceLink for FakeLink {
    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    async fn disconnect(&self) -> BotResult<()> {
        self.connected.set(false);
        self.disconnects.set(self.disconnects.get() + 1);
        Ok(())
    }

    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        on_end: EndHook,
    ) -> BotResult<Rc<dyn TrackControl>> {
        if self.fail_play.get() {
            return Err(BotError::ConnectionFailed("transport rejected source".into()));
        }
        if self.tracks.borrow().iter().any(|t| t.state() != FakeTrackState::Stopped) {
            self.overlapping_starts.set(self.overlapping_starts.get() + 1);
        }
        let track = Rc::new(FakeTrack {
            stream_url: stream_url.to_string(),
            state: Cell::new(FakeTrackState::Playing),
            volume,
            on_end,
        });
        self.tracks.borrow_mut().push(track.clone());
        Ok(track as Rc<dyn TrackControl>)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeTrackState {
    Playing,
    Paused,
    Stopped,
}

pub struct FakeTrack {
    pub stream_url: String,
    state: Cell<FakeTrackState>,
    volume: f32,
    on_end: EndHook,
}

impl FakeTrack {
    pub fn state(&self) -> FakeTrackState {
        self.state.get()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Termina la pista de forma natural y avisa al hook.
    pub fn finish(&self) {
        self.state.set(FakeTrackState::Stopped);
        (self.on_end)(TrackEnd::Finished);
    }

    pub fn fail(&self, message: &str) {
        self.state.set(FakeTrackState::Stopped);
        (self.on_end)(TrackEnd::Errored(message.to_string()));
    }
}

impl TrackControl for FakeTrack {
    fn pause(&self) -> BotResult<()> {
        self.state.set(FakeTrackState::Paused);
        Ok(())
    }

    fn resume(&self) -> BotResult<()> {
        self.state.set(FakeTrackState::Playing);
        Ok(())
    }

    fn stop(&self) -> BotResult<()> {
        self.state.set(FakeTrackState::Stopped);
        Ok(())
    }
}
