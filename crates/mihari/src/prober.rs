use std::{collections::HashMap, time::Duration};

use url::Url;

use crate::{
    error::{ProbeError, ProbeResult},
    flv::FlvClient,
    hls::HlsClient,
    info::StreamInfo,
    packet::AVPacket,
    player::Player,
    util::http::HttpClient,
};

/// Capability set every stream client implements.
///
/// `read` returns `Ok(None)` when no packet is available right now ("try
/// again"); the driver loops on it and the client is responsible for any
/// backoff. A returned error is terminal for the probe.
pub(crate) trait ProbeClient {
    async fn connect(&mut self) -> ProbeResult<StreamInfo>;
    async fn read(&mut self) -> ProbeResult<Option<AVPacket>>;
    fn close(&mut self);
}

pub(crate) enum Client {
    Flv(FlvClient),
    Hls(HlsClient),
}

impl ProbeClient for Client {
    async fn connect(&mut self) -> ProbeResult<StreamInfo> {
        match self {
            Client::Flv(client) => client.connect().await,
            Client::Hls(client) => client.connect().await,
        }
    }

    async fn read(&mut self) -> ProbeResult<Option<AVPacket>> {
        match self {
            Client::Flv(client) => client.read().await,
            Client::Hls(client) => client.read().await,
        }
    }

    fn close(&mut self) {
        match self {
            Client::Flv(client) => client.close(),
            Client::Hls(client) => client.close(),
        }
    }
}

/// Probe configuration and entry point.
#[derive(Debug, Clone, Default)]
pub struct Prober {
    /// Live stream URL; `.flv` or `.m3u8` over http/https.
    pub url: String,
    /// Player jitter buffer in milliseconds, clamped to 30 000.
    pub player_buffer_time_ms: u32,
    /// Wall-clock probe window in seconds.
    pub probe_time_sec: u32,
    /// Extra HTTP headers applied to every outbound request.
    pub header: HashMap<String, String>,
}

impl Prober {
    /// Run the probe to completion.
    ///
    /// Returns `Err` only when no `StreamInfo` can exist (unparsable URL or
    /// unsupported protocol). Every other failure is reported through the
    /// returned record: `err_code` for connection problems, partial playback
    /// fields when the stream dies mid-probe.
    pub async fn probe(&self) -> ProbeResult<StreamInfo> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(ProbeError::UnsupportedProtocol(scheme.to_string())),
        }

        let http = HttpClient::new(&self.header)?;
        let mut client = if url.path().ends_with(".flv") {
            Client::Flv(FlvClient::new(http, url))
        } else if url.path().ends_with(".m3u8") {
            Client::Hls(HlsClient::new(http, url))
        } else {
            return Err(ProbeError::UnsupportedProtocol(self.url.clone()));
        };

        self.run(&mut client).await
    }

    async fn run(&self, client: &mut Client) -> ProbeResult<StreamInfo> {
        let info = client.connect().await?;
        if !info.is_connected || info.err_code != 0 {
            client.close();
            return Ok(info);
        }

        let player = Player::spawn(self.player_buffer_time_ms, info);

        let deadline = tokio::time::sleep(Duration::from_secs(self.probe_time_sec as u64));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,

                result = client.read() => match result {
                    Ok(Some(packet)) => {
                        if !player.send(packet).await {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(error) => {
                        tracing::error!("probe read failed: {error}");
                        break;
                    }
                },
            }
        }

        client.close();
        player.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let prober = Prober {
            url: "ftp://example.com/live/stream.flv".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            prober.probe().await,
            Err(ProbeError::UnsupportedProtocol(_))
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_extensions() {
        let prober = Prober {
            url: "http://example.com/live/stream.mp4".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            prober.probe().await,
            Err(ProbeError::UnsupportedProtocol(_))
        ));
    }

    #[tokio::test]
    async fn rejects_unparsable_urls() {
        let prober = Prober {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            prober.probe().await,
            Err(ProbeError::UrlParseError(_))
        ));
    }
}
