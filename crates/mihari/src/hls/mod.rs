mod mpegts;
mod playlist;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::ProbeResult,
    info::{StreamInfo, ERR_INVALID_HTTP_CODE, ERR_TCP_CONNECT_TIMEOUT},
    packet::AVPacket,
    prober::ProbeClient,
    util::http::HttpClient,
};

use mpegts::TsDemuxer;
use playlist::{PlaylistPoller, PollerState};

/// How long to wait before retrying when no segment is queued yet.
const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_secs(1);

/// Probe client for `http(s)://…/*.m3u8` live streams.
///
/// `connect` verifies the playlist URL and spawns the playlist poller; the
/// read path drains the shared segment queue, fetching one segment at a time
/// and demuxing it packet by packet.
pub(crate) struct HlsClient {
    url: Url,
    client: HttpClient,
    state: Arc<Mutex<PollerState>>,
    cancel: Option<CancellationToken>,
    buffer: BytesMut,
    demuxer: TsDemuxer,
}

impl HlsClient {
    pub fn new(client: HttpClient, url: Url) -> Self {
        Self {
            url,
            client,
            state: Arc::new(Mutex::new(PollerState::new())),
            cancel: None,
            buffer: BytesMut::new(),
            demuxer: TsDemuxer::default(),
        }
    }
}

impl ProbeClient for HlsClient {
    async fn connect(&mut self) -> ProbeResult<StreamInfo> {
        let mut info = StreamInfo::new();

        let (response, timing) = match self.client.get_timed(&self.url).await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!("hls connect failed: {error}");
                info.err_code = ERR_TCP_CONNECT_TIMEOUT;
                return Ok(info);
            }
        };

        info.fill_connection(&timing, response.status());
        if response.status().as_u16() != 200 {
            info.err_code = ERR_INVALID_HTTP_CODE;
            return Ok(info);
        }
        drop(response);

        let cancel = CancellationToken::new();
        let poller = PlaylistPoller::new(
            self.client.clone(),
            self.url.clone(),
            self.state.clone(),
            cancel.clone(),
        );
        tokio::spawn(poller.run());
        self.cancel = Some(cancel);

        Ok(info)
    }

    async fn read(&mut self) -> ProbeResult<Option<AVPacket>> {
        if self.buffer.is_empty() {
            let segment = self.state.lock().unwrap().queue.pop_front();
            let Some(segment) = segment else {
                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                return Ok(None);
            };

            tracing::debug!("fetch segment seq={} url={}", segment.seq_id, segment.url);
            let url = Url::parse(&segment.url)?;
            let response = self.client.get(&url).await?;
            if response.status().as_u16() != 200 {
                tracing::warn!("segment fetch got http {}", response.status().as_u16());
                return Ok(None);
            }
            let body = response.bytes().await?;
            self.buffer.extend_from_slice(&body);
        }

        self.demuxer.demux(&mut self.buffer)
    }

    fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl Drop for HlsClient {
    fn drop(&mut self) {
        self.close();
    }
}
