//! Live-stream quality prober.
//!
//! Given a live `.flv` or `.m3u8` URL, mihari connects, downloads the stream
//! for a bounded window, extracts per-packet timing from the container
//! (FLV tags, or M3U8 playlists + MPEG-TS segments) and plays the packets
//! through a simulated jitter-buffered player. The result is a single
//! [`StreamInfo`] record: connection timings, first-frame latencies,
//! estimated frame rate and rebuffering statistics.
//!
//! ```no_run
//! use mihari::Prober;
//!
//! # async fn probe() -> mihari::ProbeResult<()> {
//! let prober = Prober {
//!     url: "https://example.com/live/stream.m3u8".to_string(),
//!     player_buffer_time_ms: 1000,
//!     probe_time_sec: 10,
//!     ..Default::default()
//! };
//! let info = prober.probe().await?;
//! println!("fps={} lag_rate={}", info.video_fps, info.lag_rate);
//! # Ok(())
//! # }
//! ```

mod error;
mod flv;
mod hls;
mod info;
mod packet;
mod player;
mod prober;
pub mod util;

pub use error::{ProbeError, ProbeResult};
pub use info::{ERR_INTERNAL, ERR_INVALID_HTTP_CODE, ERR_TCP_CONNECT_TIMEOUT, StreamInfo};
pub use packet::{AVPacket, PacketType};
pub use prober::Prober;
