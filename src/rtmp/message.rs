// RTMP message layer: protocol-control bookkeeping (chunk size, window ack
// size, ping) plus the `rtmp_make_*` helpers that build the wire bytes for
// invoke/data/status/control messages (spec.md S4.5/S4.6).

use byteorder::{BigEndian, ByteOrder};
use chrono::Utc;
use indexmap::IndexMap;

use crate::amf::AMF0Value;
use crate::error::{Error, Result};
use crate::runtime::{Deadline, Interrupt};

use super::chunk::ChunkReader;
use super::{
    RtmpCommand, RtmpData, RtmpPacket, RTMP_CHANNEL_AUDIO, RTMP_CHANNEL_DATA, RTMP_CHANNEL_INVOKE,
    RTMP_CHANNEL_PROTOCOL, RTMP_CHANNEL_VIDEO, RTMP_CHUNK_TYPE_0, RTMP_MAX_CHUNK_SIZE,
    RTMP_MIN_CHUNK_SIZE, RTMP_TYPE_AUDIO, RTMP_TYPE_DATA, RTMP_TYPE_EVENT, RTMP_TYPE_INVOKE,
    RTMP_TYPE_VIDEO,
};

use crate::buffer::FastBufferedStream;

/// Default chunk size both peers start with before any `Set Chunk Size`
/// control message is exchanged.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Default window acknowledgement size advertised to a freshly connected peer.
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Owns the negotiated chunk-size/window-ack-size state for one connection
/// and decodes the interlaced chunk stream into complete `RtmpPacket`s,
/// consuming protocol control messages (Set Chunk Size, Window Ack Size,
/// Acknowledgement) itself rather than surfacing them to the caller.
pub struct RtmpMessageLayer {
    reader: ChunkReader,
    out_chunk_size: usize,
    in_window_ack_size: u32,
    bytes_received_since_ack: u32,
    auto_response: bool,
    /// Messages queued by internal control handling (Acknowledgement,
    /// PingResponse) waiting for the caller to flush them, so a single
    /// write can coalesce them with the next user send.
    pending_writes: Vec<Vec<u8>>,
    next_transaction_id: i64,
    /// Outstanding request transaction id -> command name, so a `_result`/
    /// `_error` response can be matched back to what it answers.
    pending_requests: IndexMap<i64, String>,
    /// Bounds a peer's `Set Chunk Size` request must fall within.
    chunk_size_min: usize,
    chunk_size_max: usize,
}

impl RtmpMessageLayer {
    pub fn new() -> RtmpMessageLayer {
        RtmpMessageLayer {
            reader: ChunkReader::new(DEFAULT_CHUNK_SIZE),
            out_chunk_size: DEFAULT_CHUNK_SIZE,
            in_window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            bytes_received_since_ack: 0,
            auto_response: true,
            pending_writes: Vec::new(),
            next_transaction_id: 1,
            pending_requests: IndexMap::new(),
            chunk_size_min: RTMP_MIN_CHUNK_SIZE,
            chunk_size_max: RTMP_MAX_CHUNK_SIZE,
        }
    }

    /// Narrows the accepted range for a peer's `Set Chunk Size` request
    /// (spec.md S4.4); defaults to `RTMP_MIN_CHUNK_SIZE..=RTMP_MAX_CHUNK_SIZE`.
    pub fn set_chunk_size_bounds(&mut self, min: usize, max: usize) {
        self.chunk_size_min = min;
        self.chunk_size_max = max;
    }

    /// Allocates the next transaction id for an outgoing command, recording
    /// which command name it belongs to so a later response can be matched.
    pub fn next_transaction_id(&mut self, command_name: &str) -> i64 {
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        self.pending_requests.insert(id, command_name.to_string());
        id
    }

    /// Looks up (and removes) the command name a response's transaction id
    /// corresponds to.
    pub fn take_pending_request(&mut self, transaction_id: i64) -> Option<String> {
        self.pending_requests.shift_remove(&transaction_id)
    }

    /// Interprets a received packet's payload (spec.md S4.5/S4.6). For a
    /// `_result`/`_error` response, the command name of the original
    /// request determines which response subtype it decodes into: the
    /// transaction id is pulled off the decoded command and looked up (and
    /// removed) via `take_pending_request` before delegating to the
    /// packet-taxonomy decoder.
    pub fn decode_message(&mut self, packet: &RtmpPacket) -> Result<super::RtmpPacketKind> {
        let original_request = if packet.header.packet_type == super::RTMP_TYPE_INVOKE
            || packet.header.packet_type == super::RTMP_TYPE_FLEX_MESSAGE
        {
            let peek = RtmpCommand::decode(&packet.payload)?;
            if peek.cmd == "_result" || peek.cmd == "_error" {
                let trans_id = peek.get_argument("transId").map(|v| v.get_integer()).unwrap_or(0);
                self.take_pending_request(trans_id)
            } else {
                None
            }
        } else {
            None
        };

        super::decode_packet_kind(packet, original_request.as_deref())
    }

    /// Wire bytes queued by internal control-message handling since the
    /// last flush (Acknowledgement, PingResponse). Draining them lets a
    /// caller batch them with its next outgoing write.
    pub fn drain_pending_writes(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pending_writes)
    }

    /// Forces any pending internal responses (ack/ping) to be returned by
    /// the next `drain_pending_writes` call even if auto-response is off.
    pub fn manual_response_flush(&mut self) -> Vec<Vec<u8>> {
        self.drain_pending_writes()
    }

    pub fn set_out_chunk_size(&mut self, size: usize) {
        self.out_chunk_size = size.max(1);
    }

    pub fn out_chunk_size(&self) -> usize {
        self.out_chunk_size
    }

    pub fn set_in_window_ack_size(&mut self, size: u32) {
        self.in_window_ack_size = size;
    }

    /// Disables the automatic ack-window bookkeeping, letting a caller
    /// drive acknowledgements manually (used by tests and by callers that
    /// batch multiple packets per flush).
    pub fn set_auto_response(&mut self, auto: bool) {
        self.auto_response = auto;
    }

    /// Reads one application message, transparently applying `Set Chunk
    /// Size` to the reader and tracking bytes toward the next `Acknowledgement`.
    /// Returns `Ok(None)` for a fully-consumed `Acknowledgement` or `Set
    /// Chunk Size` control message the caller does not need to see; callers
    /// loop until a non-`None` packet arrives.
    pub async fn recv_message<R: tokio::io::AsyncRead + Unpin>(
        &mut self,
        stream: &mut FastBufferedStream<R>,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<Option<RtmpPacket>> {
        let packet = self.reader.read_packet(stream, deadline, interrupt).await?;

        self.bytes_received_since_ack = self
            .bytes_received_since_ack
            .saturating_add(packet.size() as u32);

        if self.auto_response && self.bytes_received_since_ack >= self.in_window_ack_size {
            self.pending_writes
                .push(rtmp_make_ack(self.bytes_received_since_ack));
            self.bytes_received_since_ack = 0;
        }

        if packet.header.packet_type == super::RTMP_TYPE_SET_CHUNK_SIZE && packet.payload.len() >= 4
        {
            let size = BigEndian::read_u32(&packet.payload[0..4]) as usize;
            if size < self.chunk_size_min || size > self.chunk_size_max {
                return Err(Error::protocol(format!(
                    "peer requested out-of-range chunk size {size} (allowed {}..={})",
                    self.chunk_size_min, self.chunk_size_max
                )));
            }
            self.reader.set_chunk_size(size);
            return Ok(None);
        }

        if packet.header.packet_type == super::RTMP_TYPE_WINDOW_ACKNOWLEDGEMENT_SIZE {
            return Ok(None);
        }

        if packet.header.packet_type == super::RTMP_TYPE_ACKNOWLEDGEMENT {
            return Ok(None);
        }

        if packet.header.packet_type == super::RTMP_TYPE_EVENT && packet.payload.len() >= 6 {
            let event = BigEndian::read_u16(&packet.payload[0..2]);
            const USER_CONTROL_PING_REQUEST: u16 = 6;
            if event == USER_CONTROL_PING_REQUEST && self.auto_response {
                let ts = BigEndian::read_u32(&packet.payload[2..6]);
                self.pending_writes.push(rtmp_make_ping_response(ts, self.out_chunk_size));
                return Ok(None);
            }
        }

        Ok(Some(packet))
    }
}

impl Default for RtmpMessageLayer {
    fn default() -> RtmpMessageLayer {
        RtmpMessageLayer::new()
    }
}

/// Makes RTMP ACK message
pub fn rtmp_make_ack(size: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);

    b
}

/// Makes RTMP window ACK
pub fn rtmp_make_window_ack(size: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);

    b
}

/// Makes RTMP control message to indicate peer bandwidth
pub fn rtmp_make_peer_bandwidth_set_message(size: u32, t: u8) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);
    b[16] = t;

    b
}

/// Makes RTMP control message to indicate chunk size
pub fn rtmp_make_chunk_size_set_message(size: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);

    b
}

/// Makes RTMP control message to indicate stream status
/// Use one of these for status: STREAM_BEGIN, STREAM_EOF, STREAM_DRY, STREAM_EMPTY, STREAM_READY
pub fn rtmp_make_stream_status_message(status: u16, stream_id: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00,
    ];

    BigEndian::write_u16(&mut b[12..14], status);
    BigEndian::write_u32(&mut b[14..18], stream_id);

    b
}

/// Makes RTMP ping request message
pub fn rtmp_make_ping_request(connect_time: i64, out_chunk_size: usize) -> Vec<u8> {
    let current_timestamp = Utc::now().timestamp().wrapping_sub(connect_time);

    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_PROTOCOL;
    packet.header.packet_type = RTMP_TYPE_EVENT;
    packet.header.timestamp = current_timestamp;

    packet.payload = vec![
        0,
        6,
        ((current_timestamp >> 24) as u8) & 0xff,
        ((current_timestamp >> 16) as u8) & 0xff,
        ((current_timestamp >> 8) as u8) & 0xff,
        (current_timestamp as u8) & 0xff,
    ];

    packet.header.length = packet.payload.len();

    packet.create_chunks(out_chunk_size)
}

/// Makes RTMP ping response message, echoing the timestamp the peer's
/// PingRequest carried (User Control event 7)
pub fn rtmp_make_ping_response(echo_timestamp: u32, out_chunk_size: usize) -> Vec<u8> {
    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_PROTOCOL;
    packet.header.packet_type = RTMP_TYPE_EVENT;

    packet.payload = vec![
        0,
        7,
        ((echo_timestamp >> 24) as u8) & 0xff,
        ((echo_timestamp >> 16) as u8) & 0xff,
        ((echo_timestamp >> 8) as u8) & 0xff,
        (echo_timestamp as u8) & 0xff,
    ];

    packet.header.length = packet.payload.len();

    packet.create_chunks(out_chunk_size)
}

/// Makes RTMP invoke command message
pub fn rtmp_make_invoke_message(cmd: &RtmpCommand, stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_INVOKE;
    packet.header.packet_type = RTMP_TYPE_INVOKE;
    packet.header.stream_id = stream_id;
    packet.payload = cmd.encode();
    packet.header.length = packet.payload.len();

    packet.create_chunks(out_chunk_size)
}

/// Makes RTMP data message
pub fn rtmp_make_data_message(data: &RtmpData, stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_DATA;
    packet.header.packet_type = RTMP_TYPE_DATA;
    packet.header.stream_id = stream_id;
    packet.payload = data.encode();
    packet.header.length = packet.payload.len();

    packet.create_chunks(out_chunk_size)
}

/// Makes RTMP status message
pub fn rtmp_make_status_message(
    stream_id: u32,
    level: String,
    code: String,
    description: Option<String>,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("onStatus".to_string());

    cmd.set_argument("transId".to_string(), AMF0Value::Number { value: 0.0 });
    cmd.set_argument("cmdObj".to_string(), AMF0Value::Null);

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();

    info.insert("level".to_string(), AMF0Value::String { value: level });
    info.insert("code".to_string(), AMF0Value::String { value: code });

    if let Some(d) = description {
        info.insert("description".to_string(), AMF0Value::String { value: d });
    }

    cmd.set_argument("info".to_string(), AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, stream_id, out_chunk_size)
}

/// Makes RTMP sample access message
pub fn rtmp_make_sample_access_message(stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let mut data = RtmpData::new("|RtmpSampleAccess".to_string());

    data.set_argument("bool1".to_string(), AMF0Value::Bool { value: false });
    data.set_argument("bool2".to_string(), AMF0Value::Bool { value: false });

    rtmp_make_data_message(&data, stream_id, out_chunk_size)
}

/// Makes message to respond to a connect message
pub fn rtmp_make_connect_response(
    trans_id: i64,
    object_encoding: Option<u32>,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("_result".to_string());

    cmd.set_argument(
        "transId".to_string(),
        AMF0Value::Number { value: trans_id as f64 },
    );

    let mut cmd_obj: IndexMap<String, AMF0Value> = IndexMap::new();

    cmd_obj.insert(
        "fmsVer".to_string(),
        AMF0Value::String { value: "FMS/3,0,1,123".to_string() },
    );
    cmd_obj.insert("capabilities".to_string(), AMF0Value::Number { value: 31.0 });

    cmd.set_argument(
        "cmdObj".to_string(),
        AMF0Value::Object { properties: cmd_obj },
    );

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();

    info.insert(
        "level".to_string(),
        AMF0Value::String { value: "status".to_string() },
    );
    info.insert(
        "code".to_string(),
        AMF0Value::String { value: "NetConnection.Connect.Success".to_string() },
    );
    info.insert(
        "description".to_string(),
        AMF0Value::String { value: "Connection succeeded.".to_string() },
    );

    match object_encoding {
        Some(oe) => {
            info.insert("objectEncoding".to_string(), AMF0Value::Number { value: oe as f64 });
        }
        None => {
            info.insert("objectEncoding".to_string(), AMF0Value::Undefined);
        }
    }

    cmd.set_argument("info".to_string(), AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes message to respond to a createStream message
pub fn rtmp_make_create_stream_response(
    trans_id: i64,
    stream_index: u32,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("_result".to_string());

    cmd.set_argument(
        "transId".to_string(),
        AMF0Value::Number { value: trans_id as f64 },
    );

    cmd.set_argument("cmdObj".to_string(), AMF0Value::Null);

    cmd.set_argument(
        "info".to_string(),
        AMF0Value::Number { value: stream_index as f64 },
    );

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Creates metadata message (used to send stream metadata to clients)
pub fn rtmp_make_metadata_message(
    play_stream_id: u32,
    metadata: &[u8],
    timestamp: i64,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_DATA;
    packet.header.packet_type = RTMP_TYPE_DATA;
    packet.header.stream_id = play_stream_id;
    packet.payload = metadata.to_vec();
    packet.header.length = packet.payload.len();
    packet.header.timestamp = timestamp;

    packet.create_chunks(out_chunk_size)
}

/// Creates RTMP audio codec header message
pub fn rtmp_make_audio_codec_header_message(
    play_stream_id: u32,
    aac_sequence_header: &[u8],
    timestamp: i64,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_AUDIO;
    packet.header.packet_type = RTMP_TYPE_AUDIO;
    packet.header.stream_id = play_stream_id;
    packet.payload = aac_sequence_header.to_vec();
    packet.header.length = packet.payload.len();
    packet.header.timestamp = timestamp;

    packet.create_chunks(out_chunk_size)
}

/// Creates RTMP video codec header message
pub fn rtmp_make_video_codec_header_message(
    play_stream_id: u32,
    avc_sequence_header: &[u8],
    timestamp: i64,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut packet = RtmpPacket::new_blank();

    packet.header.format = RTMP_CHUNK_TYPE_0;
    packet.header.channel_id = RTMP_CHANNEL_VIDEO;
    packet.header.packet_type = RTMP_TYPE_VIDEO;
    packet.header.stream_id = play_stream_id;
    packet.payload = avc_sequence_header.to_vec();
    packet.header.length = packet.payload.len();
    packet.header.timestamp = timestamp;

    packet.create_chunks(out_chunk_size)
}

/// Build RTMP metadata to be stored in order to send to players
pub fn rtmp_build_metadata(data: &RtmpData) -> Vec<u8> {
    let mut res = RtmpData::new("onMetaData".to_string());

    match data.get_argument("dataObj") {
        Some(arg) => res.set_argument("dataObj".to_string(), arg.clone()),
        None => res.set_argument("dataObj".to_string(), AMF0Value::Null),
    }

    res.encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_message_applies_set_chunk_size() {
        let t = crate::runtime::spawn(|i| async move { i });
        let interrupt = t.join().await.unwrap();

        let mut layer = RtmpMessageLayer::new();
        let wire = rtmp_make_chunk_size_set_message(4096);
        let mut stream = FastBufferedStream::new(&wire[..]);

        let r = layer
            .recv_message(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();

        assert!(r.is_none());
        assert_eq!(layer.reader.chunk_size(), 4096);
    }

    #[tokio::test]
    async fn test_recv_message_rejects_out_of_range_chunk_size() {
        let t = crate::runtime::spawn(|i| async move { i });
        let interrupt = t.join().await.unwrap();

        let mut layer = RtmpMessageLayer::new();
        let wire = rtmp_make_chunk_size_set_message(0);
        let mut stream = FastBufferedStream::new(&wire[..]);

        let err = layer
            .recv_message(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_recv_message_honors_custom_chunk_size_bounds() {
        let t = crate::runtime::spawn(|i| async move { i });
        let interrupt = t.join().await.unwrap();

        let mut layer = RtmpMessageLayer::new();
        layer.set_chunk_size_bounds(128, 1024);
        let wire = rtmp_make_chunk_size_set_message(4096);
        let mut stream = FastBufferedStream::new(&wire[..]);

        let err = layer
            .recv_message(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::Protocol);
    }

    #[test]
    fn test_status_message_round_trips_through_invoke_decode() {
        let wire = rtmp_make_status_message(
            1,
            "status".to_string(),
            "NetStream.Play.Start".to_string(),
            None,
            128,
        );

        // basic header + fmt0 message header precede the AMF0 payload;
        // just check the bytes needed for the invoke channel are present.
        assert!(wire.len() > 20);
    }
}
