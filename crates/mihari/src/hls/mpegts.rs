use bytes::BytesMut;

use crate::{
    error::{ProbeError, ProbeResult},
    packet::{AVPacket, PacketType},
};

pub(crate) const STREAM_TYPE_AUDIO_AAC: u8 = 0x0f;
pub(crate) const STREAM_TYPE_VIDEO_H264: u8 = 0x1b;
pub(crate) const STREAM_TYPE_VIDEO_HEVC: u8 = 0x24;

const TS_PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;

/// PIDs with no A/V relevance for the probe: CAT, TSDT, IPMP, SDT/BAT, NIT
/// actual, and the null packet.
const IGNORED_PIDS: [u16; 6] = [0x01, 0x02, 0x03, 0x11, 0x42, 0x1fff];

/// Stream ids whose PES packets carry no optional header (and thus no PTS).
const HEADERLESS_STREAM_IDS: [u8; 8] = [188, 190, 191, 240, 241, 242, 248, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PatProgram {
    pub program_number: u16,
    pub program_map_pid: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PmtStream {
    pub elementary_pid: u16,
    pub stream_type: u8,
}

/// MPEG-TS demuxer tracking PAT/PMT across segments and turning PES packet
/// starts into timed `AVPacket`s.
///
/// `demux` consumes 188-byte packets from the front of the buffer until it
/// can return a packet or the buffer runs dry; a dry buffer is cleared so the
/// caller knows to fetch the next segment.
#[derive(Default)]
pub(crate) struct TsDemuxer {
    pat: Vec<PatProgram>,
    pmt: Vec<PmtStream>,
}

impl TsDemuxer {
    pub fn demux(&mut self, buffer: &mut BytesMut) -> ProbeResult<Option<AVPacket>> {
        while buffer.len() >= TS_PACKET_SIZE {
            let packet = buffer.split_to(TS_PACKET_SIZE);
            if let Some(packet) = self.demux_packet(&packet)? {
                return Ok(Some(packet));
            }
        }
        buffer.clear();
        Ok(None)
    }

    fn demux_packet(&mut self, data: &[u8]) -> ProbeResult<Option<AVPacket>> {
        if data[0] != SYNC_BYTE {
            return Err(ProbeError::InvalidTsPacket);
        }

        let payload_unit_start = data[1] & 0x40 != 0;
        let pid = ((data[1] as u16 & 0x1f) << 8) | data[2] as u16;
        let adaptation_field_control = (data[3] & 0x30) >> 4;

        if IGNORED_PIDS.contains(&pid) {
            return Ok(None);
        }

        // 0x00 reserved, 0x02 adaptation field only: no payload either way
        if adaptation_field_control == 0x00 || adaptation_field_control == 0x02 {
            return Ok(None);
        }

        let mut payload = &data[4..];
        if adaptation_field_control == 0x03 {
            let length = payload[0] as usize;
            payload = &payload[1..];
            if length > payload.len() {
                return Err(ProbeError::InvalidTsPacket);
            }
            payload = &payload[length..];
        }

        if pid == 0 {
            if payload_unit_start {
                payload = skip_pointer_field(payload);
            }
            self.parse_pat(payload);
            return Ok(None);
        }

        if self.pat.iter().any(|p| p.program_map_pid == pid) {
            if payload_unit_start {
                payload = skip_pointer_field(payload);
            }
            self.parse_pmt(payload);
            return Ok(None);
        }

        self.parse_stream(payload, pid, payload_unit_start)
    }

    fn parse_pat(&mut self, data: &[u8]) {
        if data.len() < 8 {
            return;
        }
        let section_length = (((data[1] & 0x0f) as i32) << 8) | data[2] as i32;

        let mut entries = &data[8..];
        let mut remaining = section_length - 9;
        let mut programs = Vec::new();
        while remaining > 0 && entries.len() >= 4 {
            let program_number = u16::from_be_bytes([entries[0], entries[1]]);
            if program_number != 0 {
                programs.push(PatProgram {
                    program_number,
                    program_map_pid: u16::from_be_bytes([entries[2], entries[3]]) & 0x1fff,
                });
            }
            entries = &entries[4..];
            remaining -= 4;
        }

        self.pat = programs;
    }

    fn parse_pmt(&mut self, data: &[u8]) {
        if data.len() < 12 {
            return;
        }
        let section_length = (((data[1] & 0x0f) as i32) << 8) | data[2] as i32;
        let program_info_length = (((data[10] & 0x0f) as usize) << 8) | data[11] as usize;
        if 12 + program_info_length > data.len() {
            return;
        }

        let mut entries = &data[12 + program_info_length..];
        let mut remaining = section_length - 9 - 5;
        let mut streams = Vec::new();
        while remaining > 0 && entries.len() >= 5 {
            streams.push(PmtStream {
                stream_type: entries[0],
                elementary_pid: u16::from_be_bytes([entries[1], entries[2]]) & 0x1fff,
            });
            let es_info_length = (((entries[3] & 0x0f) as usize) << 8) | entries[4] as usize;
            if 5 + es_info_length > entries.len() {
                break;
            }
            entries = &entries[5 + es_info_length..];
            remaining -= 5;
        }

        if !streams.is_empty() {
            self.pmt = streams;
        }
    }

    fn parse_stream(
        &self,
        payload: &[u8],
        pid: u16,
        payload_unit_start: bool,
    ) -> ProbeResult<Option<AVPacket>> {
        let Some(stream) = self.pmt.iter().find(|s| s.elementary_pid == pid) else {
            return Ok(None);
        };
        if !payload_unit_start {
            return Ok(None);
        }

        let packet_type = match stream.stream_type {
            STREAM_TYPE_VIDEO_H264 | STREAM_TYPE_VIDEO_HEVC => PacketType::Video,
            _ => PacketType::Audio,
        };

        parse_pes(payload, packet_type)
    }
}

/// PES header → PTS in milliseconds.
///
/// Only packet starts reach this point, so every emitted packet is flagged as
/// a keyframe; real keyframe detection would need NAL parsing.
fn parse_pes(data: &[u8], packet_type: PacketType) -> ProbeResult<Option<AVPacket>> {
    if data.len() < 6 {
        return Err(ProbeError::InvalidPesHeader);
    }
    let start_code = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32;
    if start_code != 0x000001 {
        return Err(ProbeError::InvalidPesHeader);
    }

    let stream_id = data[3];
    if HEADERLESS_STREAM_IDS.contains(&stream_id) {
        return Ok(None);
    }

    // stream id and PES_packet_length precede the optional header
    let rest = &data[6..];
    if rest.len() < 3 {
        return Err(ProbeError::InvalidPesHeader);
    }
    if rest[0] & 0xc0 != 0x80 {
        return Err(ProbeError::InvalidPesHeader);
    }
    let pts_dts_flags = (rest[1] & 0xc0) >> 6;

    if pts_dts_flags == 2 || pts_dts_flags == 3 {
        let pts_bytes = &rest[3..];
        if pts_bytes.len() < 5 {
            return Err(ProbeError::InvalidPesHeader);
        }
        if (pts_bytes[0] & 0xf0) >> 4 != pts_dts_flags {
            return Err(ProbeError::InvalidPesHeader);
        }

        /*
         * '001x'          4 bslbf
         * PTS [32..30]    3 bslbf
         * marker_bit      1 bslbf
         * PTS [29..15]   15 bslbf
         * marker_bit      1 bslbf
         * PTS [14..0]    15 bslbf
         * marker_bit      1 bslbf
         */
        let pts = ((((pts_bytes[0] >> 1) & 0x07) as u32) << 30)
            | ((pts_bytes[1] as u32) << 22)
            | ((((pts_bytes[2] >> 1) & 0x7f) as u32) << 15)
            | ((pts_bytes[3] as u32) << 7)
            | ((pts_bytes[4] >> 1) as u32);

        return Ok(Some(AVPacket {
            packet_type,
            pts: pts / 90,
            keyframe: true,
        }));
    }

    Ok(None)
}

fn skip_pointer_field(payload: &[u8]) -> &[u8] {
    if payload.is_empty() {
        payload
    } else {
        &payload[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PMT_PID: u16 = 0x1000;
    const VIDEO_PID: u16 = 0x0100;
    const AUDIO_PID: u16 = 0x0101;

    fn ts_packet(pid: u16, payload_unit_start: bool, payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() <= TS_PACKET_SIZE - 4);
        let mut packet = vec![
            SYNC_BYTE,
            ((pid >> 8) as u8 & 0x1f) | if payload_unit_start { 0x40 } else { 0 },
            pid as u8,
            0x10,
        ];
        packet.extend_from_slice(payload);
        packet.resize(TS_PACKET_SIZE, 0xff);
        packet
    }

    fn pat_payload(program_number: u16, pmt_pid: u16) -> Vec<u8> {
        let mut payload = vec![0x00]; // pointer field
        payload.extend_from_slice(&[0x00, 0xb0, 0x0d]); // table id + section length 13
        payload.extend_from_slice(&[0x00, 0x01, 0xc1, 0x00, 0x00]);
        payload.extend_from_slice(&program_number.to_be_bytes());
        payload.extend_from_slice(&(0xe000 | pmt_pid).to_be_bytes());
        payload.extend_from_slice(&[0; 4]); // crc
        payload
    }

    fn pmt_payload(streams: &[(u8, u16)]) -> Vec<u8> {
        let section_length = 13 + 5 * streams.len() as u16;
        let mut payload = vec![0x00]; // pointer field
        payload.push(0x02);
        payload.extend_from_slice(&(0xb000 | section_length).to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x01, 0xc1, 0x00, 0x00]);
        payload.extend_from_slice(&(0xe000 | VIDEO_PID).to_be_bytes()); // pcr pid
        payload.extend_from_slice(&[0xf0, 0x00]); // program info length 0
        for (stream_type, pid) in streams {
            payload.push(*stream_type);
            payload.extend_from_slice(&(0xe000 | pid).to_be_bytes());
            payload.extend_from_slice(&[0xf0, 0x00]); // es info length 0
        }
        payload.extend_from_slice(&[0; 4]); // crc
        payload
    }

    fn pes_payload(stream_id: u8, pts_90khz: u64) -> Vec<u8> {
        let mut payload = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00];
        payload.push(0x80); // '10' marker, no flags
        payload.push(0x80); // PTS only
        payload.push(5); // header data length
        payload.push(0x20 | (((pts_90khz >> 30) as u8 & 0x07) << 1) | 1);
        payload.push((pts_90khz >> 22) as u8);
        payload.push((((pts_90khz >> 15) as u8 & 0x7f) << 1) | 1);
        payload.push((pts_90khz >> 7) as u8);
        payload.push(((pts_90khz as u8 & 0x7f) << 1) | 1);
        payload
    }

    fn demux_all(demuxer: &mut TsDemuxer, data: &[u8]) -> Vec<AVPacket> {
        let mut buffer = BytesMut::from(data);
        let mut packets = Vec::new();
        while let Some(packet) = demuxer.demux(&mut buffer).unwrap() {
            packets.push(packet);
        }
        packets
    }

    fn sample_stream(pts_90khz: u64) -> Vec<u8> {
        let mut data = ts_packet(0, true, &pat_payload(1, PMT_PID));
        data.extend_from_slice(&ts_packet(
            PMT_PID,
            true,
            &pmt_payload(&[
                (STREAM_TYPE_VIDEO_H264, VIDEO_PID),
                (STREAM_TYPE_AUDIO_AAC, AUDIO_PID),
            ]),
        ));
        data.extend_from_slice(&ts_packet(VIDEO_PID, true, &pes_payload(0xe0, pts_90khz)));
        data
    }

    #[test]
    fn pes_pts_is_converted_to_milliseconds() {
        let packets = demux_all(&mut TsDemuxer::default(), &sample_stream(90000));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pts, 1000);
        assert_eq!(packets[0].packet_type, PacketType::Video);
        assert!(packets[0].keyframe);
    }

    #[test]
    fn audio_pid_yields_audio_packets() {
        let mut demuxer = TsDemuxer::default();
        let mut data = sample_stream(90000);
        data.extend_from_slice(&ts_packet(AUDIO_PID, true, &pes_payload(0xc0, 180000)));

        let packets = demux_all(&mut demuxer, &data);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].packet_type, PacketType::Audio);
        assert_eq!(packets[1].pts, 2000);
    }

    #[test]
    fn demux_is_invariant_under_segment_chunking() {
        let mut data = sample_stream(90000);
        data.extend_from_slice(&ts_packet(AUDIO_PID, true, &pes_payload(0xc0, 180000)));

        let whole = demux_all(&mut TsDemuxer::default(), &data);

        let mut demuxer = TsDemuxer::default();
        let mut chunked = Vec::new();
        for chunk in data.chunks(TS_PACKET_SIZE) {
            chunked.extend(demux_all(&mut demuxer, chunk));
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn ignored_and_unknown_pids_yield_nothing() {
        let mut demuxer = TsDemuxer::default();
        let mut data = ts_packet(0x1fff, false, &[0xff; 16]);
        data.extend_from_slice(&ts_packet(0x0011, true, &[0x00; 16]));
        data.extend_from_slice(&ts_packet(0x0234, true, &pes_payload(0xe0, 90000)));

        assert!(demux_all(&mut demuxer, &data).is_empty());
    }

    #[test]
    fn adaptation_field_is_skipped() {
        let mut demuxer = TsDemuxer::default();
        demux_all(&mut demuxer, &sample_stream(90000));

        // same PES payload behind a 10-byte adaptation field
        let pes = pes_payload(0xe0, 270000);
        let mut packet = vec![
            SYNC_BYTE,
            0x40 | (VIDEO_PID >> 8) as u8,
            VIDEO_PID as u8,
            0x30,
            9, // adaptation field length
        ];
        packet.extend_from_slice(&[0x00; 9]);
        packet.extend_from_slice(&pes);
        packet.resize(TS_PACKET_SIZE, 0xff);

        let packets = demux_all(&mut demuxer, &packet);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pts, 3000);
    }

    #[test]
    fn adaptation_only_packet_is_dropped() {
        let mut demuxer = TsDemuxer::default();
        let mut packet = vec![SYNC_BYTE, (VIDEO_PID >> 8) as u8, VIDEO_PID as u8, 0x20];
        packet.resize(TS_PACKET_SIZE, 0xff);
        assert!(demux_all(&mut demuxer, &packet).is_empty());
    }

    #[test]
    fn missing_sync_byte_is_fatal() {
        let mut buffer = BytesMut::from(&[0u8; TS_PACKET_SIZE][..]);
        assert!(matches!(
            TsDemuxer::default().demux(&mut buffer),
            Err(ProbeError::InvalidTsPacket)
        ));
    }

    #[test]
    fn headerless_stream_ids_are_skipped() {
        let mut demuxer = TsDemuxer::default();
        demux_all(&mut demuxer, &sample_stream(90000));

        let padding = ts_packet(VIDEO_PID, true, &pes_payload(190, 90000));
        assert!(demux_all(&mut demuxer, &padding).is_empty());
    }

    #[test]
    fn bad_pes_start_code_is_fatal() {
        let mut demuxer = TsDemuxer::default();
        demux_all(&mut demuxer, &sample_stream(90000));

        let mut buffer = BytesMut::from(&ts_packet(VIDEO_PID, true, &[0xab; 16])[..]);
        assert!(matches!(
            demuxer.demux(&mut buffer),
            Err(ProbeError::InvalidPesHeader)
        ));
    }

    #[test]
    fn trailing_partial_packet_clears_the_buffer() {
        let mut demuxer = TsDemuxer::default();
        let mut data = sample_stream(90000);
        data.extend_from_slice(&[SYNC_BYTE, 0x00, 0x00]); // truncated packet

        let mut buffer = BytesMut::from(&data[..]);
        let mut packets = Vec::new();
        while let Some(packet) = demuxer.demux(&mut buffer).unwrap() {
            packets.push(packet);
        }
        assert_eq!(packets.len(), 1);
        assert!(buffer.is_empty());
    }
}
