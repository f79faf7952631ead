//! Byte-level fixtures for probe integration tests: a minimal live FLV
//! stream and MPEG-TS segments with a single program.
#![allow(dead_code)]

pub const TS_PACKET_SIZE: usize = 188;

pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x0100;

pub const STREAM_TYPE_H264: u8 = 0x1b;

pub fn flv_header() -> Vec<u8> {
    let mut data = vec![b'F', b'L', b'V', 1, 0x05];
    data.extend_from_slice(&9u32.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data
}

pub fn flv_tag(tag_type: u8, timestamp: u32, body: &[u8]) -> Vec<u8> {
    let mut data = vec![tag_type];
    data.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    data.extend_from_slice(&timestamp.to_be_bytes()[1..]);
    data.push((timestamp >> 24) as u8);
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(body);
    data.extend_from_slice(&(11 + body.len() as u32).to_be_bytes());
    data
}

/// AVC video tag body: keyframe flag, codec id 7, NALU packet type, 24-bit
/// composition time, dummy payload.
pub fn avc_video_body(keyframe: bool, composition_time: i32) -> Vec<u8> {
    let frame_type: u8 = if keyframe { 1 } else { 2 };
    let mut body = vec![(frame_type << 4) | 7, 1];
    body.extend_from_slice(&(composition_time as u32).to_be_bytes()[1..]);
    body.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    body
}

/// AAC audio tag body; packet type 1 is a raw frame, 0 a sequence header.
pub fn aac_audio_body(packet_type: u8) -> Vec<u8> {
    vec![0xaf, packet_type, 0x21, 0x42]
}

/// An FLV stream with one metadata tag, one AVC keyframe (timestamp 0,
/// composition time 40) and one raw AAC frame (timestamp 23).
pub fn sample_flv_stream() -> Vec<u8> {
    let mut data = flv_header();
    data.extend_from_slice(&flv_tag(18, 0, &[0x02, 0x00, 0x0a]));
    data.extend_from_slice(&flv_tag(9, 0, &avc_video_body(true, 40)));
    data.extend_from_slice(&flv_tag(8, 23, &aac_audio_body(1)));
    data
}

pub fn ts_packet(pid: u16, payload_unit_start: bool, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= TS_PACKET_SIZE - 4);
    let mut packet = vec![
        0x47,
        ((pid >> 8) as u8 & 0x1f) | if payload_unit_start { 0x40 } else { 0 },
        pid as u8,
        0x10,
    ];
    packet.extend_from_slice(payload);
    packet.resize(TS_PACKET_SIZE, 0xff);
    packet
}

pub fn pat_payload() -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.extend_from_slice(&[0x00, 0xb0, 0x0d]);
    payload.extend_from_slice(&[0x00, 0x01, 0xc1, 0x00, 0x00]);
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&(0xe000 | PMT_PID).to_be_bytes());
    payload.extend_from_slice(&[0; 4]);
    payload
}

pub fn pmt_payload() -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.push(0x02);
    payload.extend_from_slice(&(0xb000 | 18u16).to_be_bytes());
    payload.extend_from_slice(&[0x00, 0x01, 0xc1, 0x00, 0x00]);
    payload.extend_from_slice(&(0xe000 | VIDEO_PID).to_be_bytes());
    payload.extend_from_slice(&[0xf0, 0x00]);
    payload.push(STREAM_TYPE_H264);
    payload.extend_from_slice(&(0xe000 | VIDEO_PID).to_be_bytes());
    payload.extend_from_slice(&[0xf0, 0x00]);
    payload.extend_from_slice(&[0; 4]);
    payload
}

pub fn pes_payload(pts_90khz: u64) -> Vec<u8> {
    let mut payload = vec![0x00, 0x00, 0x01, 0xe0, 0x00, 0x00];
    payload.push(0x80);
    payload.push(0x80);
    payload.push(5);
    payload.push(0x20 | (((pts_90khz >> 30) as u8 & 0x07) << 1) | 1);
    payload.push((pts_90khz >> 22) as u8);
    payload.push((((pts_90khz >> 15) as u8 & 0x7f) << 1) | 1);
    payload.push((pts_90khz >> 7) as u8);
    payload.push(((pts_90khz as u8 & 0x7f) << 1) | 1);
    payload
}

/// A one-program TS segment: PAT, PMT and a single H.264 PES start carrying
/// the given presentation time.
pub fn ts_segment(pts_90khz: u64) -> Vec<u8> {
    let mut data = ts_packet(0, true, &pat_payload());
    data.extend_from_slice(&ts_packet(PMT_PID, true, &pmt_payload()));
    data.extend_from_slice(&ts_packet(VIDEO_PID, true, &pes_payload(pts_90khz)));
    data
}

pub fn media_playlist(media_sequence: u64, uris: &[&str]) -> String {
    let mut body = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:{media_sequence}\n"
    );
    for uri in uris {
        body.push_str(&format!("#EXTINF:2.0,\n{uri}\n"));
    }
    body
}
