mod demux;

use std::{pin::Pin, time::Duration};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use url::Url;

use crate::{
    error::{ProbeError, ProbeResult},
    info::{StreamInfo, ERR_INVALID_HTTP_CODE, ERR_TCP_CONNECT_TIMEOUT},
    packet::AVPacket,
    prober::ProbeClient,
    util::http::HttpClient,
};

use demux::FlvDemuxer;

type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// How long to back off before reporting "no packet" once the response body
/// has ended. Live FLV streams do not normally end; the probe timer decides
/// when to stop.
const STREAM_END_BACKOFF: Duration = Duration::from_millis(10);

/// A corrupt stream keeps failing at the same tag; give up after this many
/// consecutive decode failures instead of spinning until the probe timer.
const MAX_DECODE_ERRORS: u32 = 30;

/// Probe client for `http(s)://…/*.flv` live streams.
pub(crate) struct FlvClient {
    url: Url,
    client: HttpClient,
    body: Option<BodyStream>,
    demuxer: FlvDemuxer,
    decode_errors: u32,
}

impl FlvClient {
    pub fn new(client: HttpClient, url: Url) -> Self {
        Self {
            url,
            client,
            body: None,
            demuxer: FlvDemuxer::new(),
            decode_errors: 0,
        }
    }
}

impl ProbeClient for FlvClient {
    async fn connect(&mut self) -> ProbeResult<StreamInfo> {
        let mut info = StreamInfo::new();

        let (response, timing) = match self.client.get_timed(&self.url).await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!("flv connect failed: {error}");
                info.err_code = ERR_TCP_CONNECT_TIMEOUT;
                return Ok(info);
            }
        };

        info.fill_connection(&timing, response.status());
        if response.status().as_u16() != 200 {
            info.err_code = ERR_INVALID_HTTP_CODE;
            return Ok(info);
        }

        self.body = Some(Box::pin(response.bytes_stream()));
        Ok(info)
    }

    async fn read(&mut self) -> ProbeResult<Option<AVPacket>> {
        let body = self
            .body
            .as_mut()
            .ok_or_else(|| std::io::Error::other("flv body not connected"))?;

        loop {
            match self.demuxer.next_packet() {
                Ok(Some(packet)) => {
                    self.decode_errors = 0;
                    return Ok(Some(packet));
                }
                Ok(None) => {}
                Err(error) => {
                    self.decode_errors += 1;
                    if self.decode_errors >= MAX_DECODE_ERRORS {
                        return Err(error);
                    }
                    tracing::warn!("invalid flv tag: {error}");
                    return Ok(None);
                }
            }

            match body.next().await {
                Some(Ok(chunk)) => self.demuxer.extend(&chunk),
                Some(Err(error)) => {
                    tracing::warn!("flv body read failed: {error}");
                    tokio::time::sleep(STREAM_END_BACKOFF).await;
                    return Ok(None);
                }
                None => {
                    tokio::time::sleep(STREAM_END_BACKOFF).await;
                    return Ok(None);
                }
            }
        }
    }

    fn close(&mut self) {
        self.body = None;
    }
}
