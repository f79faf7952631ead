use bytes::{Buf, BytesMut};

use crate::{
    error::{ProbeError, ProbeResult},
    packet::{AVPacket, PacketType},
};

const TAG_TYPE_AUDIO: u8 = 8;
const TAG_TYPE_VIDEO: u8 = 9;

const FRAME_TYPE_KEYFRAME: u8 = 1;

const CODEC_ID_AVC: u8 = 7;
const CODEC_ID_HEVC: u8 = 12;

const SOUND_FORMAT_AAC: u8 = 10;
const AAC_PACKET_TYPE_RAW: u8 = 1;

/// Incremental FLV tag demuxer.
///
/// Bytes are appended as they arrive from the network; `next_packet` yields
/// one audio/video packet per decodable tag and asks for more data with
/// `Ok(None)` when the buffered prefix is incomplete. Script tags, AAC
/// sequence headers and other non-sample tags are skipped internally.
pub(crate) struct FlvDemuxer {
    buffer: BytesMut,
    header_done: bool,
}

impl FlvDemuxer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            header_done: false,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn next_packet(&mut self) -> ProbeResult<Option<AVPacket>> {
        loop {
            if !self.header_done {
                if !self.try_header()? {
                    return Ok(None);
                }
            }

            // tag header: type(8) data_size(24) timestamp(24+8) stream_id(24)
            if self.buffer.len() < 11 {
                return Ok(None);
            }
            let data_size = be24(&self.buffer[1..4]) as usize;
            let total = 11 + data_size + 4;
            if self.buffer.len() < total {
                return Ok(None);
            }

            let tag_type = self.buffer[0] & 0x1f;
            let timestamp = be24(&self.buffer[4..7]) | ((self.buffer[7] as u32) << 24);
            let body = &self.buffer[11..11 + data_size];

            let packet = match tag_type {
                TAG_TYPE_VIDEO => parse_video(body, timestamp),
                TAG_TYPE_AUDIO => parse_audio(body, timestamp),
                _ => Ok(None),
            };

            // the tag span is known even when its body is malformed; always
            // consume it so a corrupt tag is skipped, not re-parsed forever
            self.buffer.advance(total);

            if let Some(packet) = packet? {
                return Ok(Some(packet));
            }
        }
    }

    /// Consume the 9-byte file header plus PreviousTagSize0.
    fn try_header(&mut self) -> ProbeResult<bool> {
        if self.buffer.len() < 9 {
            return Ok(false);
        }
        if &self.buffer[0..3] != b"FLV" {
            return Err(ProbeError::InvalidFlvData("bad signature"));
        }
        let data_offset = u32::from_be_bytes([
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
            self.buffer[8],
        ]) as usize;
        if data_offset < 9 {
            return Err(ProbeError::InvalidFlvData("bad data offset"));
        }
        if self.buffer.len() < data_offset + 4 {
            return Ok(false);
        }
        self.buffer.advance(data_offset + 4);
        self.header_done = true;
        Ok(true)
    }
}

fn parse_video(body: &[u8], timestamp: u32) -> ProbeResult<Option<AVPacket>> {
    if body.is_empty() {
        return Err(ProbeError::InvalidFlvData("empty video tag"));
    }
    let frame_type = (body[0] & 0xf0) >> 4;
    let codec_id = body[0] & 0x0f;

    // AVC/HEVC carry a packet type byte and a signed 24-bit composition time
    // offset between the tag timestamp (dts) and the presentation time.
    let composition_time = if codec_id == CODEC_ID_AVC || codec_id == CODEC_ID_HEVC {
        if body.len() < 5 {
            return Err(ProbeError::InvalidFlvData("short avc video tag"));
        }
        sign_extend_24(be24(&body[2..5]))
    } else {
        0
    };

    Ok(Some(AVPacket {
        packet_type: PacketType::Video,
        pts: timestamp.wrapping_add(composition_time as u32),
        keyframe: frame_type == FRAME_TYPE_KEYFRAME,
    }))
}

fn parse_audio(body: &[u8], timestamp: u32) -> ProbeResult<Option<AVPacket>> {
    if body.is_empty() {
        return Err(ProbeError::InvalidFlvData("empty audio tag"));
    }
    let sound_format = (body[0] & 0xf0) >> 4;
    if sound_format != SOUND_FORMAT_AAC {
        return Ok(None);
    }
    if body.len() < 2 {
        return Err(ProbeError::InvalidFlvData("short aac audio tag"));
    }
    // only raw AAC frames are samples; sequence headers carry no timing
    if body[1] != AAC_PACKET_TYPE_RAW {
        return Ok(None);
    }

    Ok(Some(AVPacket {
        packet_type: PacketType::Audio,
        pts: timestamp,
        keyframe: false,
    }))
}

fn be24(data: &[u8]) -> u32 {
    ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32
}

fn sign_extend_24(value: u32) -> i32 {
    ((value << 8) as i32) >> 8
}
