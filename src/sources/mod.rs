pub mod ytdlp;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{error::BotResult, models::Track};

pub use ytdlp::YtDlpResolver;

/// Turns a user-supplied URL into a playable [`Track`].
///
/// Resolution is slow network work; implementations must not block the
/// thread that drives the voice transport while it runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait(?Send)]
pub trait TrackResolver {
    /// Fails with `ResolutionError` when no playable stream can be found.
    async fn resolve(&self, url: &str, requester_id: Option<String>) -> BotResult<Track>;
}

/// Client-facing handle for a track: stable across processes for the same
/// URL and requester.
pub fn track_id(url: &str, requester_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(requester_id.unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
