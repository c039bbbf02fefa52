//! # API Module
//!
//! HTTP control facade. Every route except `/health` goes through the
//! [`CommandBridge`], so handlers stay `Send` while the voice state they
//! operate on never leaves the voice loop thread.

pub mod handlers;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::bridge::CommandBridge;

pub struct AppState {
    pub bridge: CommandBridge,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/play", post(handlers::play))
        .route("/stop", post(handlers::stop))
        .route("/pause", post(handlers::pause))
        .route("/resume", post(handlers::resume))
        .route("/leave", post(handlers::leave))
        .route("/status/{guild_id}", get(handlers::status))
        .route("/now-playing/{guild_id}", get(handlers::now_playing))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BotIdentity, BridgeTimeouts, CoreSettings, ReadySignal, VoiceCore, VoiceLoop};
    use crate::error::BotError;
    use crate::sources::MockTrackResolver;
    use crate::testing::{track, FakeGateway};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::task::LocalSet;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn resolver() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .withf(|url, _| url.contains("broken"))
            .returning(|_, _| Err(BotError::ResolutionError("no stream".into())));
        resolver
            .expect_resolve()
            .withf(|url, _| !url.contains("broken"))
            .returning(|url, requester| {
                let mut resolved = track("Song A", url, 180);
                resolved.requester_id = requester;
                Ok(resolved)
            });
        resolver
    }

    /// Router servido por un bucle de voz real sobre el LocalSet actual.
    fn spawn_app(gateway: Rc<FakeGateway>, ready: ReadySignal) -> (Router, CancellationToken) {
        let (bridge, jobs) = CommandBridge::new(ready, BridgeTimeouts::default());
        let (core, completions) = VoiceCore::new(
            gateway,
            Rc::new(resolver()),
            CoreSettings {
                settle_delay: Duration::from_millis(100),
                default_volume: 0.25,
            },
        );
        let shutdown = CancellationToken::new();
        tokio::task::spawn_local(
            VoiceLoop::new(core, jobs, completions, None, shutdown.clone()).run(),
        );
        (router(Arc::new(AppState { bridge })), shutdown)
    }

    fn ready() -> ReadySignal {
        let ready = ReadySignal::new();
        ready.mark_ready(BotIdentity {
            user_id: 1,
            tag: "relay#0001".to_string(),
        });
        ready
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reads_readiness_directly() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[]), ReadySignal::new());
                let (status, body) = send(&app, "GET", "/health", None).await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body, json!({"status": "healthy", "bot_ready": false, "bot_user": null}));

                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[]), ready());
                let (_, body) = send(&app, "GET", "/health", None).await;
                assert_eq!(body, json!({"status": "healthy", "bot_ready": true, "bot_user": "relay#0001"}));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn play_then_query_status() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[(7, "General")]), ready());

                let (status, body) = send(
                    &app,
                    "POST",
                    "/play",
                    Some(json!({"guild_id": "42", "channel_id": 7, "url": "https://example/a", "user_id": "99"})),
                )
                .await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body, json!({"success": true, "title": "Song A", "error": ""}));

                let (status, body) = send(&app, "GET", "/status/42", None).await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body["connected"], json!(true));
                assert_eq!(body["playback_state"]["status"], json!("playing"));
                assert_eq!(body["playback_state"]["volume"], json!(0.25));
                assert_eq!(
                    body["voice_connection"],
                    json!({"guild_id": 42, "channel_id": 7, "channel_name": "General", "connected": true})
                );
                assert_eq!(
                    body["now_playing"],
                    json!({"title": "Song A", "uploader": "Unknown", "duration": 180, "formatted_duration": "03:00"})
                );

                let (_, body) = send(&app, "GET", "/now-playing/42", None).await;
                assert_eq!(body["playing"], json!(true));
                assert_eq!(body["track"]["requester_id"], json!("99"));
                assert_eq!(body["message"], json!("Now playing: Song A"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn domain_failures_stay_inside_play_body() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[(7, "General")]), ready());

                let (status, body) = send(
                    &app,
                    "POST",
                    "/play",
                    Some(json!({"guild_id": 42, "channel_id": 99, "url": "https://example/a"})),
                )
                .await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(
                    body,
                    json!({"success": false, "title": "", "error": "Failed to play music: Channel 99 not found"})
                );

                let (_, body) = send(
                    &app,
                    "POST",
                    "/play",
                    Some(json!({"guild_id": 42, "channel_id": 7, "url": "https://example/broken"})),
                )
                .await;
                assert_eq!(
                    body["error"],
                    json!("Failed to play music: Failed to process URL: no stream")
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn pause_resume_stop_and_leave_messages() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[(7, "General")]), ready());
                let guild = json!({"guild_id": 42});

                let (_, body) = send(&app, "POST", "/pause", Some(guild.clone())).await;
                assert_eq!(body, json!("No music to pause"));
                let (_, body) = send(&app, "POST", "/stop", Some(guild.clone())).await;
                assert_eq!(body, json!({"success": false, "title": "", "error": "No music was playing"}));
                let (_, body) = send(&app, "POST", "/leave", Some(guild.clone())).await;
                assert_eq!(body, json!("Not connected to voice channel"));

                send(
                    &app,
                    "POST",
                    "/play",
                    Some(json!({"guild_id": 42, "channel_id": 7, "url": "https://example/a"})),
                )
                .await;

                let (_, body) = send(&app, "POST", "/resume", Some(guild.clone())).await;
                assert_eq!(body, json!("No paused music to resume"));
                let (_, body) = send(&app, "POST", "/pause", Some(guild.clone())).await;
                assert_eq!(body, json!("Paused: Song A"));
                let (_, body) = send(&app, "POST", "/resume", Some(guild.clone())).await;
                assert_eq!(body, json!("Resumed: Song A"));
                let (_, body) = send(&app, "POST", "/stop", Some(guild.clone())).await;
                assert_eq!(body, json!({"success": true, "title": "Stopped: Song A", "error": ""}));

                let (_, body) = send(&app, "GET", "/now-playing/42", None).await;
                assert_eq!(body["status"], json!("stopped"));

                let (_, body) = send(&app, "POST", "/leave", Some(guild.clone())).await;
                assert_eq!(body, json!("Left voice channel"));
                let (_, body) = send(&app, "GET", "/status/42", None).await;
                assert_eq!(body["connected"], json!(false));
                assert_eq!(body["voice_connection"], Value::Null);
            })
            .await;
    }

    #[tokio::test]
    async fn invalid_ids_are_bad_requests() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[]), ready());

                let (status, body) = send(&app, "POST", "/pause", Some(json!({"guild_id": 0}))).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, json!({"detail": "Invalid guild_id"}));

                let (status, _) = send(&app, "GET", "/status/not-a-number", None).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_maps_to_service_unavailable() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (app, _shutdown) = spawn_app(FakeGateway::with_voice_channels(&[(7, "General")]), ReadySignal::new());

                let (status, body) = send(&app, "POST", "/pause", Some(json!({"guild_id": 42}))).await;
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert!(body["detail"].as_str().unwrap().starts_with("Bot not ready"));

                let (status, _) = send(
                    &app,
                    "POST",
                    "/play",
                    Some(json!({"guild_id": 42, "channel_id": 7, "url": "https://example/a"})),
                )
                .await;
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            })
            .await;
    }
}
