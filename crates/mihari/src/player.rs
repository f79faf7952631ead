use std::collections::VecDeque;
use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ProbeResult,
    info::StreamInfo,
    packet::{AVPacket, PacketType},
};

const CHANNEL_CAPACITY: usize = 256;
const MAX_BUFFER_TIME_MS: u32 = 30_000;

/// Number of buffered video packets needed before the frame rate estimate.
const FPS_ESTIMATE_WINDOW: usize = 60;
const DEFAULT_FPS: f32 = 30.0;

/// Jitter-buffered player simulator.
///
/// Runs as its own task: packets arrive over a bounded channel, a ticker
/// paces the virtual rendering. The task owns the `StreamInfo` during
/// playback and hands it back, finalized, at shutdown.
pub(crate) struct Player {
    tx: mpsc::Sender<AVPacket>,
    cancel: CancellationToken,
    handle: JoinHandle<StreamInfo>,
}

impl Player {
    pub fn spawn(buffer_time_ms: u32, info: StreamInfo) -> Self {
        let buffer_time = Duration::from_millis(clamp_buffer_time(buffer_time_ms) as u64);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(rx, cancel.clone(), buffer_time, info));
        Self { tx, cancel, handle }
    }

    /// Forward one packet; blocks while the channel is full. Returns false
    /// once the player task is gone.
    pub async fn send(&self, packet: AVPacket) -> bool {
        self.tx.send(packet).await.is_ok()
    }

    pub async fn shutdown(self) -> ProbeResult<StreamInfo> {
        self.cancel.cancel();
        drop(self.tx);
        Ok(self.handle.await?)
    }
}

fn clamp_buffer_time(buffer_time_ms: u32) -> u32 {
    buffer_time_ms.min(MAX_BUFFER_TIME_MS)
}

async fn run(
    mut rx: mpsc::Receiver<AVPacket>,
    cancel: CancellationToken,
    buffer_time: Duration,
    mut info: StreamInfo,
) -> StreamInfo {
    let mut vqueue: VecDeque<AVPacket> = VecDeque::with_capacity(CHANNEL_CAPACITY);
    let mut aqueue: VecDeque<AVPacket> = VecDeque::with_capacity(CHANNEL_CAPACITY);

    let mut frame_duration = Duration::ZERO;
    // never assigned: audio-only playback does not progress
    let audio_frame_duration = Duration::ZERO;
    let mut lag_time = Instant::now();
    let mut start_time = Instant::now();

    let mut start_play = false;
    let mut has_video = false;
    let mut has_audio = false;
    let mut rebuffer = false;

    let mut ticker = time::interval(Duration::from_millis(30));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            packet = rx.recv() => {
                let Some(packet) = packet else { break };

                if packet.packet_type == PacketType::Video {
                    tracing::trace!("video pkt pts={} vqueue={}", packet.pts, vqueue.len());
                    if !has_video {
                        has_video = true;
                        info.first_video_pkt_time_ms =
                            info.start_time.elapsed().as_millis() as u32;
                        tracing::debug!("first video packet after {:?}", info.start_time.elapsed());
                    }

                    vqueue.push_back(packet);

                    if !start_play && vqueue.len() >= FPS_ESTIMATE_WINDOW {
                        let fps = estimate_fps(&vqueue);
                        info.video_fps = fps;
                        frame_duration = Duration::from_micros((1_000_000.0 / fps) as u64);
                        let buffered = frame_duration * vqueue.len() as u32;

                        if buffered >= buffer_time {
                            start_play = true;
                            start_time = Instant::now();
                            ticker = time::interval_at(Instant::now() + frame_duration, frame_duration);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                            if !buffer_time.is_zero() {
                                let keep =
                                    (buffer_time.as_nanos() / frame_duration.as_nanos()) as usize;
                                vqueue.truncate(keep);
                            }

                            tracing::debug!(
                                "fps={fps} frame_duration={frame_duration:?} buffer_time={buffer_time:?}"
                            );
                        }
                    }
                } else {
                    if !has_audio {
                        has_audio = true;
                        info.first_audio_pkt_time_ms =
                            info.start_time.elapsed().as_millis() as u32;
                        tracing::debug!("first audio packet after {:?}", info.start_time.elapsed());
                    }

                    aqueue.push_back(packet);
                }
            }

            _ = ticker.tick() => {
                if !start_play {
                    continue;
                }

                let (queue, duration) = if has_video {
                    aqueue.clear();
                    (&mut vqueue, frame_duration)
                } else {
                    (&mut aqueue, audio_frame_duration)
                };

                let buffered = duration * queue.len() as u32;
                if rebuffer && buffered >= buffer_time {
                    rebuffer = false;
                    info.total_lag_time_ms += lag_time.elapsed().as_millis() as u32;
                    tracing::debug!("rebuffer recovered after {:?}", lag_time.elapsed());
                }
                if rebuffer {
                    continue;
                }

                if queue.pop_front().is_none() {
                    rebuffer = true;
                    info.total_lag_count += 1;
                    lag_time = Instant::now();
                }
            }
        }
    }

    if !start_play {
        return info;
    }

    if rebuffer {
        info.total_lag_time_ms += lag_time.elapsed().as_millis() as u32;
    }

    let total_play_time_ms = start_time.elapsed().as_millis() as f32;
    if total_play_time_ms > 0.0 {
        info.lag_rate = info.total_lag_time_ms as f32 / total_play_time_ms;
    }

    tracing::debug!("player cycle end");
    info
}

/// Estimate the frame rate from consecutive PTS deltas of the buffered video
/// packets. Only deltas in (0, 100) ms count as samples; without any valid
/// sample the estimate falls back to 30 fps.
fn estimate_fps(vqueue: &VecDeque<AVPacket>) -> f32 {
    let mut iter = vqueue.iter();
    let Some(first) = iter.next() else {
        return DEFAULT_FPS;
    };

    let mut last_pts = first.pts as i32 as i64;
    let mut count = 0i64;
    let mut total_duration = 0i64;
    for packet in iter {
        let pts = packet.pts as i32 as i64;
        let delta = pts - last_pts;
        if delta > 0 && delta < 100 {
            total_duration += delta;
            count += 1;
        }
        last_pts = pts;
    }

    if total_duration == 0 {
        DEFAULT_FPS
    } else {
        count as f32 / total_duration as f32 * 1000.0
    }
}
