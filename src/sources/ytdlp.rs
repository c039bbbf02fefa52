use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{track_id, TrackResolver};
use crate::{
    error::{BotError, BotResult},
    models::Track,
};

/// Resolver que delega la extracción en un proceso yt-dlp.
///
/// El trabajo pesado ocurre fuera del hilo de voz: el proceso hijo corre
/// aparte y su salida se espera de forma asíncrona.
pub struct YtDlpResolver {
    program: String,
    format: String,
}

/// Campos de `--dump-json` que nos interesan
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    url: Option<String>,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    /// Registra la versión de yt-dlp; solo avisa si no está instalado.
    pub async fn verify(&self) {
        match Command::new(&self.program).arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
            }
            _ => warn!("⚠️ {} no está disponible, /play fallará", self.program),
        }
    }

    fn validate_url(raw: &str) -> BotResult<()> {
        let parsed = Url::parse(raw)
            .map_err(|_| BotError::ResolutionError(format!("URL mal formada: {raw}")))?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(BotError::ResolutionError(format!(
                "Esquema no soportado: {other}"
            ))),
        }
    }

    fn parse_output(stdout: &[u8], url: &str, requester_id: Option<String>) -> BotResult<Track> {
        let info: YtDlpInfo = serde_json::from_slice(stdout)
            .map_err(|e| BotError::ResolutionError(format!("Respuesta de yt-dlp inválida: {e}")))?;

        let stream_url = info
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BotError::ResolutionError("No playable URL found".to_string()))?;

        Ok(Track {
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
            duration: info.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            url: url.to_string(),
            stream_url,
            track_id: track_id(url, requester_id.as_deref()),
            requester_id,
        })
    }
}

#[async_trait(?Send)]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, url: &str, requester_id: Option<String>) -> BotResult<Track> {
        Self::validate_url(url)?;
        debug!("📊 Obteniendo info de: {}", url);

        let output = Command::new(&self.program)
            .args(["--no-playlist", "--dump-json", "-f", &self.format, "--no-warnings", url])
            .output()
            .await
            .map_err(|e| BotError::ResolutionError(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(BotError::ResolutionError(format!("yt-dlp error: {}", error.trim())));
        }

        let track = Self::parse_output(&output.stdout, url, requester_id)?;
        info!("🎵 Resuelto '{}' ({}s) de {}", track.title, track.duration, track.uploader);
        Ok(track)
    }
}
