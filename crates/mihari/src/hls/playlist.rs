use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use m3u8_rs::Playlist;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::{ProbeError, ProbeResult},
    util::http::HttpClient,
};

/// One media segment discovered from a live playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TsSegment {
    pub url: String,
    pub seq_id: u64,
}

/// Shared between the poller task and the client's read path.
pub(crate) struct PollerState {
    pub queue: VecDeque<TsSegment>,
    /// Highest sequence id already queued; -1 until the first segment.
    pub last_seq_id: i64,
    /// Media playlist resolved from the master playlist, if any.
    pub media_url: Option<Url>,
}

impl PollerState {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_seq_id: -1,
            media_url: None,
        }
    }
}

/// Background task refreshing the playlist and growing the segment queue.
///
/// The polling interval adjusts itself: a master playlist is followed up
/// immediately, a parsed media playlist a second later, and errors retry
/// after a second.
pub(crate) struct PlaylistPoller {
    client: HttpClient,
    master_url: Url,
    state: Arc<Mutex<PollerState>>,
    cancel: CancellationToken,
}

const POLL_NOW: Duration = Duration::from_millis(1);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

impl PlaylistPoller {
    pub fn new(
        client: HttpClient,
        master_url: Url,
        state: Arc<Mutex<PollerState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            master_url,
            state,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut interval = POLL_NOW;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            interval = self.poll_once().await;
        }
    }

    async fn poll_once(&self) -> Duration {
        let url = {
            let state = self.state.lock().unwrap();
            state.media_url.clone()
        }
        .unwrap_or_else(|| self.master_url.clone());

        let body = match self.fetch(&url).await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!("fetch m3u8 failed: {error}");
                return POLL_INTERVAL;
            }
        };

        match self.handle_playlist(&url, &body) {
            Ok(interval) => interval,
            Err(error) => {
                tracing::warn!("parse m3u8 error: {error}");
                POLL_INTERVAL
            }
        }
    }

    async fn fetch(&self, url: &Url) -> ProbeResult<bytes::Bytes> {
        Ok(self.client.get(url).await?.bytes().await?)
    }

    fn handle_playlist(&self, url: &Url, body: &[u8]) -> ProbeResult<Duration> {
        let playlist = match m3u8_rs::parse_playlist(body) {
            Ok((_, playlist)) => playlist,
            Err(error) => return Err(ProbeError::M3u8ParseError(format!("{error:?}"))),
        };

        match playlist {
            Playlist::MasterPlaylist(master) => {
                let variant = master
                    .variants
                    .first()
                    .ok_or_else(|| ProbeError::M3u8ParseError("no variants".to_string()))?;
                let media_url = url.join(&variant.uri)?;
                tracing::info!("media playlist url={media_url}");
                self.state.lock().unwrap().media_url = Some(media_url);
                Ok(POLL_NOW)
            }
            Playlist::MediaPlaylist(media) => {
                if media.end_list {
                    return Err(ProbeError::NotLiveM3u8);
                }

                let mut state = self.state.lock().unwrap();
                for (i, segment) in media.segments.iter().enumerate() {
                    let seq_id = media.media_sequence + i as u64;
                    if seq_id as i64 <= state.last_seq_id {
                        continue;
                    }

                    let url = resolve_segment_uri(&self.master_url, &segment.uri);
                    tracing::debug!("new ts url={url}");
                    state.queue.push_back(TsSegment { url, seq_id });
                    state.last_seq_id = seq_id as i64;
                }

                Ok(POLL_INTERVAL)
            }
        }
    }
}

/// Relative segment URIs resolve against the probe URL's scheme and host;
/// absolute ones pass through.
fn resolve_segment_uri(base: &Url, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }

    let mut host = base.host_str().unwrap_or_default().to_string();
    if let Some(port) = base.port() {
        host.push_str(&format!(":{port}"));
    }

    if uri.starts_with('/') {
        format!("{}://{}{}", base.scheme(), host, uri)
    } else {
        format!("{}://{}/{}", base.scheme(), host, uri)
    }
}
