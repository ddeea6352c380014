// RTMP packet model

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::Result;

use super::command::RtmpCommand;
use super::data::RtmpData;
use super::{
    RTMP_CHUNK_TYPE_0, RTMP_CHUNK_TYPE_1, RTMP_CHUNK_TYPE_2, RTMP_CHUNK_TYPE_3,
    RTMP_PACKET_BASE_SIZE, RTMP_TYPE_ACKNOWLEDGEMENT, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA,
    RTMP_TYPE_EVENT, RTMP_TYPE_FLEX_MESSAGE, RTMP_TYPE_INVOKE, RTMP_TYPE_SET_CHUNK_SIZE,
    RTMP_TYPE_SET_PEER_BANDWIDTH, RTMP_TYPE_VIDEO, RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE,
};

/// Header of an RTMP packet
#[derive(Clone)]
pub struct RtmpPacketHeader {
    /// Timestamp
    pub timestamp: i64,

    /// Packet format
    pub format: u32,

    /// Channel ID
    pub channel_id: u32,

    /// Packet type
    pub packet_type: u32,

    /// Stream ID
    pub stream_id: u32,

    // Payload length
    pub length: usize,
}

impl RtmpPacketHeader {
    /// Resets the header
    pub fn reset(&mut self) {
        *self = RtmpPacketHeader {
            timestamp: 0,
            format: 0,
            channel_id: 0,
            packet_type: 0,
            stream_id: 0,
            length: 0,
        };
    }
}

/// RTMP packet
#[derive(Clone)]
pub struct RtmpPacket {
    /// Packet header
    pub header: RtmpPacketHeader,

    /// Clock value (Used for extended timestamp)
    pub clock: i64,

    /// Current packet size
    pub bytes: usize,

    /// True if the packet was handled
    pub handled: bool,

    // True if used
    pub used: bool,

    /// Packet payload
    pub payload: Vec<u8>,
}

impl RtmpPacket {
    /// Creates new blank RTMP packet
    pub fn new_blank() -> RtmpPacket {
        RtmpPacket {
            header: RtmpPacketHeader {
                timestamp: 0,
                format: 0,
                channel_id: 0,
                packet_type: 0,
                stream_id: 0,
                length: 0,
            },
            clock: 0,
            bytes: 0,
            handled: false,
            used: false,
            payload: Vec::new(),
        }
    }

    /// Resets the payload and sets handled to false
    pub fn reset(&mut self) {
        self.handled = false;
        self.payload.truncate(0);
        self.bytes = 0;
    }

    /// Fully resets the packet
    pub fn reset_full(&mut self) {
        self.header.reset();
        self.clock = 0;
        self.bytes = 0;
        self.handled = false;
        self.used = false;
        self.payload = Vec::new();
    }

    /// Gets packet total size
    pub fn size(&self) -> usize {
        self.payload.len().wrapping_add(RTMP_PACKET_BASE_SIZE)
    }

    /// Serializes a basic header for a RTMP packet
    /// fmt - Packet format
    /// cid - Packet channel ID
    /// Returns the serialized bytes
    pub fn serialize_basic_header(format: u32, channel_id: u32) -> Vec<u8> {
        if channel_id >= 64 + 255 {
            vec![
                ((format << 6) as u8) | 1,
                ((channel_id - 64) as u8),
                (((channel_id - 64) >> 8) as u8),
            ]
        } else if channel_id >= 64 {
            vec![(format << 6) as u8, ((channel_id - 64) as u8)]
        } else {
            vec![((format << 6) as u8) | (channel_id as u8)]
        }
    }

    /// Serializes the header of a RTMP packet
    /// Returns the serialized bytes
    pub fn serialize_chunk_message_header(&self, stream_id: u32) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();

        if self.header.format <= RTMP_CHUNK_TYPE_2 {
            let mut b: Vec<u8> = vec![0; 4];

            if self.header.timestamp >= 0xffffff {
                BigEndian::write_u32(&mut b, 0xffffff);
            } else {
                BigEndian::write_u32(&mut b, self.header.timestamp as u32);
            }

            out.extend(&b[1..]);
        }

        if self.header.format <= RTMP_CHUNK_TYPE_1 {
            let mut b: Vec<u8> = vec![0; 4];

            BigEndian::write_u32(&mut b, self.header.length as u32);

            out.extend(&b[1..]);
            out.push(self.header.packet_type as u8);
        }

        if self.header.format == RTMP_CHUNK_TYPE_0 {
            let mut b: Vec<u8> = vec![0; 4];

            LittleEndian::write_u32(&mut b, stream_id);

            out.extend(b);
        }

        out
    }

    /// Creates the chunks for an RTMP packet
    /// out_chunk_size - Size of the output chunks
    pub fn create_chunks(&self, out_chunk_size: usize) -> Vec<u8> {
        self.create_chunks_for_stream(self.header.stream_id, out_chunk_size)
    }

    /// Creates the chunks for an RTMP packet
    /// stream_id - Stream ID
    /// out_chunk_size - Size of the output chunks
    pub fn create_chunks_for_stream(&self, stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
        let chunk_basic_header =
            Self::serialize_basic_header(self.header.format, self.header.channel_id);

        let chunk_basic_header_3 =
            Self::serialize_basic_header(RTMP_CHUNK_TYPE_3, self.header.channel_id);

        let chunk_message_header = self.serialize_chunk_message_header(stream_id);

        let use_extended_timestamp = self.header.timestamp >= 0xffffff;

        let mut header_size = chunk_basic_header.len() + chunk_message_header.len();
        let mut payload_size = self.header.length;

        if payload_size > self.payload.len() {
            payload_size = self.payload.len();
        }

        let mut chunks_offset: usize = 0;
        let mut payload_offset: usize = 0;

        if use_extended_timestamp {
            header_size += 4;
        }

        let mut n = header_size + payload_size + (payload_size / out_chunk_size);

        if use_extended_timestamp {
            n += (payload_size / out_chunk_size) * 4
        }

        if payload_size > 0 && payload_size % out_chunk_size == 0 {
            n -= 1;

            if use_extended_timestamp {
                n -= 4;
            }
        }

        let mut chunks: Vec<u8> = vec![0; n];

        chunks[chunks_offset..chunks_offset + chunk_basic_header.len()]
            .copy_from_slice(&chunk_basic_header);

        chunks_offset += chunk_basic_header.len();

        chunks[chunks_offset..chunks_offset + chunk_message_header.len()]
            .copy_from_slice(&chunk_message_header);

        chunks_offset += chunk_message_header.len();

        if use_extended_timestamp {
            BigEndian::write_u32(
                &mut chunks[chunks_offset..chunks_offset + 4],
                self.header.timestamp as u32,
            );
            chunks_offset += 4;
        }

        while payload_size > 0 {
            if payload_size > out_chunk_size {
                let sub_payload = &self.payload[payload_offset..payload_offset + out_chunk_size];

                chunks[chunks_offset..chunks_offset + sub_payload.len()]
                    .copy_from_slice(sub_payload);

                payload_size -= out_chunk_size;
                chunks_offset += out_chunk_size;
                payload_offset += out_chunk_size;

                chunks[chunks_offset..chunks_offset + chunk_basic_header_3.len()]
                    .copy_from_slice(&chunk_basic_header_3);

                chunks_offset += chunk_basic_header_3.len();

                if use_extended_timestamp {
                    BigEndian::write_u32(
                        &mut chunks[chunks_offset..chunks_offset + 4],
                        self.header.timestamp as u32,
                    );
                    chunks_offset += 4;
                }
            } else {
                let sub_payload = &self.payload[payload_offset..payload_offset + payload_size];

                chunks[chunks_offset..chunks_offset + sub_payload.len()]
                    .copy_from_slice(sub_payload);

                payload_size = 0;
                chunks_offset += payload_size;
                payload_offset += payload_size;
            }
        }

        chunks
    }
}

/// User Control Message event types (spec.md S4.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControlEvent {
    StreamBegin,
    StreamEof,
    StreamDry,
    SetBufferLength,
    StreamIsRecorded,
    PingRequest,
    PingResponse,
    Other(u16),
}

impl UserControlEvent {
    fn from_code(code: u16) -> UserControlEvent {
        match code {
            0 => UserControlEvent::StreamBegin,
            1 => UserControlEvent::StreamEof,
            2 => UserControlEvent::StreamDry,
            3 => UserControlEvent::SetBufferLength,
            4 => UserControlEvent::StreamIsRecorded,
            6 => UserControlEvent::PingRequest,
            7 => UserControlEvent::PingResponse,
            other => UserControlEvent::Other(other),
        }
    }
}

/// Peer bandwidth limit type carried by `SetPeerBandwidth`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBandwidthLimitType {
    Hard,
    Soft,
    Dynamic,
    Other(u8),
}

impl PeerBandwidthLimitType {
    fn from_code(code: u8) -> PeerBandwidthLimitType {
        match code {
            0 => PeerBandwidthLimitType::Hard,
            1 => PeerBandwidthLimitType::Soft,
            2 => PeerBandwidthLimitType::Dynamic,
            other => PeerBandwidthLimitType::Other(other),
        }
    }
}

/// The decoded meaning of a packet's payload, dispatched on message type
/// and (for invoke messages) the AMF0 command name (spec.md S4.6).
pub enum RtmpPacketKind {
    ConnectApp(RtmpCommand),
    ConnectAppResponse(RtmpCommand),
    CreateStream(RtmpCommand),
    CreateStreamResponse(RtmpCommand),
    CloseStream(RtmpCommand),
    FmleStart(RtmpCommand),
    FmleStartResponse(RtmpCommand),
    Publish(RtmpCommand),
    Pause(RtmpCommand),
    Play(RtmpCommand),
    PlayResponse(RtmpCommand),
    OnBwDone(RtmpCommand),
    OnStatusCall(RtmpCommand),
    OnStatusData(RtmpData),
    SampleAccess(RtmpData),
    OnMetaData(RtmpData),
    SetWindowAckSize(u32),
    Acknowledgement(u32),
    SetChunkSize(u32),
    SetPeerBandwidth {
        limit: u32,
        limit_type: PeerBandwidthLimitType,
    },
    UserControl {
        event: UserControlEvent,
        data: Vec<u8>,
    },
    Audio,
    Video,
    /// Unrecognized AMF0 command, so the caller can decide (spec.md S4.6)
    GenericCall(RtmpCommand),
}

/// Decodes a packet's payload according to its message type, and for AMF0
/// commands, the command name carried inside. `original_request` is the
/// command name the caller's transaction-id map had on file for a `_result`/
/// `_error` response (spec.md S4.5); it decides which response subtype the
/// response decodes into, and is irrelevant for every other command/type.
pub fn decode_packet_kind(
    packet: &RtmpPacket,
    original_request: Option<&str>,
) -> Result<RtmpPacketKind> {
    match packet.header.packet_type {
        t if t == RTMP_TYPE_INVOKE || t == RTMP_TYPE_FLEX_MESSAGE => {
            let cmd = RtmpCommand::decode(&packet.payload)?;
            Ok(match cmd.cmd.as_str() {
                "connect" => RtmpPacketKind::ConnectApp(cmd),
                "_result" | "_error" => match original_request {
                    Some("createStream") => RtmpPacketKind::CreateStreamResponse(cmd),
                    Some("play") | Some("play2") => RtmpPacketKind::PlayResponse(cmd),
                    Some("releaseStream") | Some("FCPublish") | Some("FCUnpublish") => {
                        RtmpPacketKind::FmleStartResponse(cmd)
                    }
                    _ => RtmpPacketKind::ConnectAppResponse(cmd),
                },
                "createStream" => RtmpPacketKind::CreateStream(cmd),
                "closeStream" | "deleteStream" => RtmpPacketKind::CloseStream(cmd),
                "releaseStream" | "FCPublish" | "FCUnpublish" => RtmpPacketKind::FmleStart(cmd),
                "onFCPublish" => RtmpPacketKind::FmleStartResponse(cmd),
                "publish" => RtmpPacketKind::Publish(cmd),
                "pause" => RtmpPacketKind::Pause(cmd),
                "play" | "play2" => RtmpPacketKind::Play(cmd),
                "onStatus" => RtmpPacketKind::OnStatusCall(cmd),
                "onBWDone" => RtmpPacketKind::OnBwDone(cmd),
                _ => RtmpPacketKind::GenericCall(cmd),
            })
        }
        t if t == RTMP_TYPE_DATA => {
            let data = RtmpData::decode(&packet.payload)?;
            Ok(match data.tag.as_str() {
                "onMetaData" | "@setDataFrame" => RtmpPacketKind::OnMetaData(data),
                "|RtmpSampleAccess" => RtmpPacketKind::SampleAccess(data),
                _ => RtmpPacketKind::OnStatusData(data),
            })
        }
        t if t == RTMP_TYPE_SET_CHUNK_SIZE => {
            let size = read_u32_payload(packet)?;
            Ok(RtmpPacketKind::SetChunkSize(size))
        }
        t if t == RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE => {
            let size = read_u32_payload(packet)?;
            Ok(RtmpPacketKind::SetWindowAckSize(size))
        }
        t if t == RTMP_TYPE_ACKNOWLEDGEMENT => {
            let size = read_u32_payload(packet)?;
            Ok(RtmpPacketKind::Acknowledgement(size))
        }
        t if t == RTMP_TYPE_SET_PEER_BANDWIDTH => {
            if packet.payload.len() < 5 {
                return Err(crate::error::Error::protocol("set peer bandwidth payload too short"));
            }
            let limit = BigEndian::read_u32(&packet.payload[0..4]);
            let limit_type = PeerBandwidthLimitType::from_code(packet.payload[4]);
            Ok(RtmpPacketKind::SetPeerBandwidth { limit, limit_type })
        }
        t if t == RTMP_TYPE_EVENT => {
            if packet.payload.len() < 2 {
                return Err(crate::error::Error::protocol("user control payload too short"));
            }
            let event = UserControlEvent::from_code(BigEndian::read_u16(&packet.payload[0..2]));
            Ok(RtmpPacketKind::UserControl {
                event,
                data: packet.payload[2..].to_vec(),
            })
        }
        t if t == RTMP_TYPE_AUDIO => Ok(RtmpPacketKind::Audio),
        t if t == RTMP_TYPE_VIDEO => Ok(RtmpPacketKind::Video),
        other => Err(crate::error::Error::protocol(format!(
            "unrecognized packet type {other}"
        ))),
    }
}

fn read_u32_payload(packet: &RtmpPacket) -> Result<u32> {
    if packet.payload.len() < 4 {
        return Err(crate::error::Error::protocol("control message payload too short"));
    }
    Ok(BigEndian::read_u32(&packet.payload[0..4]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AMF0Value;

    #[test]
    fn test_decode_connect_app() {
        let mut cmd = RtmpCommand::new("connect".to_string());
        cmd.set_argument("transId".to_string(), AMF0Value::Number { value: 1.0 });

        let mut packet = RtmpPacket::new_blank();
        packet.header.packet_type = RTMP_TYPE_INVOKE;
        packet.payload = cmd.encode();

        match decode_packet_kind(&packet, None).unwrap() {
            RtmpPacketKind::ConnectApp(c) => assert_eq!(c.cmd, "connect"),
            _ => panic!("expected ConnectApp"),
        }
    }

    #[test]
    fn test_decode_set_chunk_size() {
        let mut packet = RtmpPacket::new_blank();
        packet.header.packet_type = RTMP_TYPE_SET_CHUNK_SIZE;
        packet.payload = vec![0, 0, 16, 0];

        match decode_packet_kind(&packet, None).unwrap() {
            RtmpPacketKind::SetChunkSize(size) => assert_eq!(size, 4096),
            _ => panic!("expected SetChunkSize"),
        }
    }

    #[test]
    fn test_decode_result_resolves_to_original_request() {
        let mut cmd = RtmpCommand::new("_result".to_string());
        cmd.set_argument("transId".to_string(), AMF0Value::Number { value: 2.0 });

        let mut packet = RtmpPacket::new_blank();
        packet.header.packet_type = RTMP_TYPE_INVOKE;
        packet.payload = cmd.encode();

        match decode_packet_kind(&packet, Some("createStream")).unwrap() {
            RtmpPacketKind::CreateStreamResponse(c) => assert_eq!(c.cmd, "_result"),
            _ => panic!("expected CreateStreamResponse"),
        }

        match decode_packet_kind(&packet, Some("play")).unwrap() {
            RtmpPacketKind::PlayResponse(c) => assert_eq!(c.cmd, "_result"),
            _ => panic!("expected PlayResponse"),
        }

        match decode_packet_kind(&packet, None).unwrap() {
            RtmpPacketKind::ConnectAppResponse(c) => assert_eq!(c.cmd, "_result"),
            _ => panic!("expected ConnectAppResponse as the fallback"),
        }
    }
}
