use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::models::*;
use super::AppState;
use crate::error::BotError;

/// POST /play
pub async fn play(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlayRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let (guild_id, channel_id) = request.ids()?;
    info!("🎵 Play request: guild {} canal {} url {}", guild_id, channel_id, request.url);

    let url = request.url;
    let requester_id = request.user_id;
    let timeout = state.bridge.timeouts().play;
    let result = state
        .bridge
        .call(timeout, move |core| async move {
            core.play_in_channel(guild_id, channel_id, url, requester_id)
                .await
        })
        .await;

    match result {
        Ok(track) => {
            info!("✅ Reproduciendo: {}", track.title);
            Ok(Json(ActionResponse::ok(track.title)))
        }
        Err(e) if e.is_bridge_failure() => Err(e.into()),
        Err(e) => {
            warn!("❌ Play error: {}", e);
            Ok(Json(ActionResponse::failed(play_error_message(&e))))
        }
    }
}

fn play_error_message(error: &BotError) -> String {
    match error {
        BotError::PlaybackFailed(cause) => format!("Failed to play music: {cause}"),
        other => format!("Failed to play music: {other}"),
    }
}

/// POST /stop
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let guild_id = request.guild()?;
    info!("⏹️ Stop request: guild {}", guild_id);

    let timeout = state.bridge.timeouts().connect;
    let (stopped, title) = state
        .bridge
        .call(timeout, move |core| async move {
            let title = current_title(core.playback.state(guild_id).current_track.as_ref());
            Ok((core.playback.stop(guild_id), title))
        })
        .await?;

    Ok(Json(if stopped {
        ActionResponse::ok(format!("Stopped: {title}"))
    } else {
        ActionResponse::failed("No music was playing")
    }))
}

/// POST /pause
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<String>, ApiError> {
    let guild_id = request.guild()?;
    info!("⏸️ Pause request: guild {}", guild_id);

    let timeout = state.bridge.timeouts().connect;
    let (paused, title) = state
        .bridge
        .call(timeout, move |core| async move {
            let title = current_title(core.playback.state(guild_id).current_track.as_ref());
            Ok((core.playback.pause(guild_id), title))
        })
        .await?;

    Ok(Json(if paused {
        format!("Paused: {title}")
    } else {
        "No music to pause".to_string()
    }))
}

/// POST /resume
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<String>, ApiError> {
    let guild_id = request.guild()?;
    info!("▶️ Resume request: guild {}", guild_id);

    let timeout = state.bridge.timeouts().connect;
    let (resumed, title) = state
        .bridge
        .call(timeout, move |core| async move {
            let title = current_title(core.playback.state(guild_id).current_track.as_ref());
            Ok((core.playback.resume(guild_id), title))
        })
        .await?;

    Ok(Json(if resumed {
        format!("Resumed: {title}")
    } else {
        "No paused music to resume".to_string()
    }))
}

/// POST /leave
pub async fn leave(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<String>, ApiError> {
    let guild_id = request.guild()?;
    info!("👋 Leave request: guild {}", guild_id);

    let timeout = state.bridge.timeouts().connect;
    let left = state
        .bridge
        .call(timeout, move |core| async move {
            Ok(core.sessions.leave(guild_id).await)
        })
        .await?;

    Ok(Json(if left {
        "Left voice channel".to_string()
    } else {
        "Not connected to voice channel".to_string()
    }))
}

/// GET /status/{guild_id}
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(guild_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let guild_id = serenity::model::id::GuildId::new(parse_path_id(&guild_id, "guild_id")?);

    let timeout = state.bridge.timeouts().connect;
    let status = state
        .bridge
        .call(timeout, move |core| async move { Ok(core.status(guild_id)) })
        .await?;

    Ok(Json(StatusResponse::from(status)))
}

/// GET /now-playing/{guild_id}
pub async fn now_playing(
    State(state): State<Arc<AppState>>,
    Path(guild_id): Path<String>,
) -> Result<Json<NowPlayingResponse>, ApiError> {
    let guild_id = serenity::model::id::GuildId::new(parse_path_id(&guild_id, "guild_id")?);

    let timeout = state.bridge.timeouts().connect;
    let playback = state
        .bridge
        .call(timeout, move |core| async move { Ok(core.playback.state(guild_id)) })
        .await?;

    Ok(Json(NowPlayingResponse::from(playback)))
}

/// GET /health
///
/// Reads the readiness flag directly; it never waits on the voice loop.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ready = state.bridge.ready();
    Json(HealthResponse {
        status: "healthy",
        bot_ready: ready.is_ready(),
        bot_user: ready.identity().map(|identity| identity.tag),
    })
}

fn current_title(track: Option<&crate::models::Track>) -> String {
    track.map_or_else(|| "No track".to_string(), |t| t.title.clone())
}
