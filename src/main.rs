use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod api;
mod bot;
mod bridge;
mod config;
mod error;
mod models;
mod playback;
mod registry;
mod sources;
mod voice;

#[cfg(test)]
mod testing;

use crate::api::AppState;
use crate::bot::MusicBot;
use crate::bridge::{CommandBridge, Job, ReadySignal, VoiceCore, VoiceLoop};
use crate::config::Config;
use crate::sources::YtDlpResolver;
use crate::voice::songbird::SongbirdGateway;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar configuración
    let config = Config::load()?;

    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("voice_relay={}", config.log_level).parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Voice Relay v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    let ready = ReadySignal::new();
    let (bridge, jobs) = CommandBridge::new(ready, config.bridge_timeouts());
    let shutdown = CancellationToken::new();

    let voice_thread = spawn_voice_thread(config.clone(), bridge.clone(), jobs, shutdown.clone())?;
    let mut voice_exit = tokio::task::spawn_blocking(move || voice_thread.join());

    // API HTTP
    let app = api::router(Arc::new(AppState { bridge }));
    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 API escuchando en http://{}", addr);

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let voice_finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("⚠️ Señal de shutdown recibida, cerrando...");
            false
        }
        exit = &mut voice_exit => {
            match exit {
                Ok(Ok(Ok(()))) => warn!("🔌 El cliente de Discord terminó"),
                Ok(Ok(Err(e))) => error!("❌ Error en el hilo de voz: {:?}", e),
                _ => error!("❌ El hilo de voz terminó de forma inesperada"),
            }
            true
        }
    };

    shutdown.cancel();

    if !voice_finished && tokio::time::timeout(Duration::from_secs(5), voice_exit).await.is_err() {
        warn!("⏰ El hilo de voz no se detuvo a tiempo");
    }

    match server.await {
        Ok(Ok(())) => info!("👋 API detenida"),
        Ok(Err(e)) => error!("Error en el servidor HTTP: {:?}", e),
        Err(e) => error!("Tarea del servidor HTTP abortada: {:?}", e),
    }

    Ok(())
}

/// Runs the Discord client and the voice loop on a dedicated single-threaded runtime.
fn spawn_voice_thread(
    config: Config,
    bridge: CommandBridge,
    jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) -> Result<std::thread::JoinHandle<Result<()>>> {
    let handle = std::thread::Builder::new()
        .name("voice-loop".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let local = LocalSet::new();
            local.block_on(&runtime, run_voice(config, bridge, jobs, shutdown))
        })?;
    Ok(handle)
}

async fn run_voice(
    config: Config,
    bridge: CommandBridge,
    jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) -> Result<()> {
    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let handler = MusicBot::new(bridge, config.auto_leave_grace);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird.clone())
        .await?;

    let resolver = YtDlpResolver::new(config.ytdlp_path.clone(), config.ytdl_format.clone());
    resolver.verify().await;

    // Sin timeout total: el stream dura lo que dure la pista
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let gateway = SongbirdGateway::new(client.cache.clone(), songbird, http);

    let (core, completions) = VoiceCore::new(Rc::new(gateway), Rc::new(resolver), config.core_settings());
    let voice_loop = VoiceLoop::new(
        core,
        jobs,
        completions,
        config.stale_sweep_interval,
        shutdown.clone(),
    );
    let pump = tokio::task::spawn_local(voice_loop.run());

    // Cerrar los shards cuando se pida el shutdown
    let shard_manager = client.shard_manager.clone();
    let shard_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shard_shutdown.cancelled().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Conectando al gateway de Discord...");
    let result = client.start().await;

    shutdown.cancel();
    if let Err(e) = pump.await {
        error!("Error al detener el bucle de voz: {:?}", e);
    }

    result.map_err(Into::into)
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
