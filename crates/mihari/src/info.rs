use std::time::Instant;

use serde::Serialize;

use crate::util::http::ConnectTiming;

/// Connection could not be established within the transport timeout.
pub const ERR_TCP_CONNECT_TIMEOUT: i32 = 1001;
/// The server answered with a non-200 status code.
pub const ERR_INVALID_HTTP_CODE: i32 = 1002;
/// Reserved for unexpected internal failures; no path sets it currently.
pub const ERR_INTERNAL: i32 = 1003;

/// The single output record of a probe.
///
/// Connection-phase fields are filled by the client during `connect`, the
/// playback-phase fields by the player simulator. The same record travels
/// through the whole probe and is returned regardless of success or error.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    #[serde(skip)]
    pub start_time: Instant,

    pub is_connected: bool,
    pub err_code: i32,
    pub dns_time_ms: u32,
    pub tcp_connect_time_ms: u32,
    pub tls_handshake_time_ms: u32,
    pub ttfb_ms: u32,
    pub first_video_pkt_time_ms: u32,
    pub first_audio_pkt_time_ms: u32,
    pub total_lag_time_ms: u32,
    pub total_lag_count: u32,
    pub video_fps: f32,
    pub lag_rate: f32,
    pub http_code: u16,
    pub remote_addr: String,
    pub local_addr: String,
}

impl StreamInfo {
    pub(crate) fn new() -> Self {
        Self {
            start_time: Instant::now(),
            is_connected: false,
            err_code: 0,
            dns_time_ms: 0,
            tcp_connect_time_ms: 0,
            tls_handshake_time_ms: 0,
            ttfb_ms: 0,
            first_video_pkt_time_ms: 0,
            first_audio_pkt_time_ms: 0,
            total_lag_time_ms: 0,
            total_lag_count: 0,
            video_fps: 0.0,
            lag_rate: 0.0,
            http_code: 0,
            remote_addr: String::new(),
            local_addr: String::new(),
        }
    }

    pub(crate) fn fill_connection(&mut self, timing: &ConnectTiming, status: reqwest::StatusCode) {
        self.is_connected = true;
        self.dns_time_ms = timing.dns.as_millis() as u32;
        self.tcp_connect_time_ms = timing.tcp.as_millis() as u32;
        self.tls_handshake_time_ms = timing.tls.as_millis() as u32;
        self.ttfb_ms = timing.ttfb.as_millis() as u32;
        self.remote_addr = timing
            .remote_addr
            .map(|a| a.to_string())
            .unwrap_or_default();
        self.local_addr = timing.local_addr.map(|a| a.to_string()).unwrap_or_default();
        self.http_code = status.as_u16();
    }
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self::new()
    }
}
