/// Kind of media a parsed packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Audio,
    Video,
}

/// Minimal parsed media unit: enough timing to drive the player simulator.
///
/// `pts` is in milliseconds and wrap-tolerant (FLV timestamps are already
/// milliseconds; MPEG-TS 90 kHz timestamps are divided by 90 on the way in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AVPacket {
    pub packet_type: PacketType,
    pub pts: u32,
    pub keyframe: bool,
}
