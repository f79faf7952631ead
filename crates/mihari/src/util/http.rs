use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT},
    Client, Response,
};
use rustls::{crypto::ring, pki_types::ServerName, ClientConfig, RootCertStore};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::TlsConnector;
use url::Url;

use crate::error::ProbeResult;

const DEFAULT_USER_AGENT: &str = concat!("mihari/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection-phase measurements taken while establishing a probe request.
///
/// DNS, TCP and TLS are measured on a dedicated probe socket that is dropped
/// afterwards; TTFB is measured on the real request (send to response
/// headers). The probe socket also yields the concrete peer/local addresses.
#[derive(Debug, Clone, Default)]
pub struct ConnectTiming {
    pub dns: Duration,
    pub tcp: Duration,
    pub tls: Duration,
    pub ttfb: Duration,
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
}

/// Thin wrapper around `reqwest::Client` carrying the probe's header set.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    tls: TlsConnector,
}

impl HttpClient {
    pub fn new(header: &HashMap<String, String>) -> ProbeResult<Self> {
        let mut headers = HeaderMap::new();
        for (key, value) in header {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                tracing::warn!("skipping invalid header: {key}");
                continue;
            };
            headers.insert(name, value);
        }
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        let client = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|error| std::io::Error::other(error.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            client,
            tls: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Plain GET with the probe's default headers applied.
    pub async fn get(&self, url: &Url) -> ProbeResult<Response> {
        Ok(self.client.get(url.clone()).send().await?)
    }

    /// GET with connection-phase timing measurements.
    pub async fn get_timed(&self, url: &Url) -> ProbeResult<(Response, ConnectTiming)> {
        let mut timing = self.probe_connection(url).await?;

        let begin = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        timing.ttfb = begin.elapsed();

        Ok((response, timing))
    }

    /// Resolve, connect and (for https) handshake once to measure the
    /// DNS/TCP/TLS phases, then drop the socket.
    async fn probe_connection(&self, url: &Url) -> ProbeResult<ConnectTiming> {
        let host = url
            .host_str()
            .ok_or_else(|| std::io::Error::other("url has no host"))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let mut timing = ConnectTiming::default();

        let begin = Instant::now();
        let mut addrs = lookup_host((host, port)).await?;
        timing.dns = begin.elapsed();
        let addr = addrs
            .next()
            .ok_or_else(|| std::io::Error::other(format!("no address resolved for {host}")))?;

        let begin = Instant::now();
        let stream = TcpStream::connect(addr).await?;
        timing.tcp = begin.elapsed();
        timing.remote_addr = stream.peer_addr().ok();
        timing.local_addr = stream.local_addr().ok();

        if url.scheme() == "https" {
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|_| std::io::Error::other(format!("invalid server name: {host}")))?;
            let begin = Instant::now();
            let _tls = self.tls.connect(server_name, stream).await?;
            timing.tls = begin.elapsed();
        }

        Ok(timing)
    }
}
