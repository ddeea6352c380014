// Chunk stream reassembly: turns an interlaced byte stream of basic
// header + chunk message header + payload fragments back into complete
// `RtmpPacket`s, one cached state machine per channel id (srs_protocol_
// rtmp_stack.hpp's `SrsChunkStream`: fmt, cid, cached header, extended-
// timestamp flag, partially-read message).

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::runtime::{Deadline, Interrupt};

use super::packet::{RtmpPacket, RtmpPacketHeader};
use super::{RTMP_CHUNK_TYPE_0, RTMP_CHUNK_TYPE_1, RTMP_CHUNK_TYPE_2, RTMP_CHUNK_TYPE_3};

use crate::buffer::FastBufferedStream;
use crate::log::Logger;

const EXTENDED_TIMESTAMP_MARKER: i64 = 0xffffff;

/// Per-channel cached state, so a format-1/2/3 chunk can inherit whatever
/// fields it omits from the last complete header seen on that channel.
struct ChunkStreamState {
    header: RtmpPacketHeader,
    extended_timestamp: bool,
    /// Bytes of the current message accumulated so far. Empty between messages.
    payload: Vec<u8>,
    /// Timestamp delta from format-1/2 chunks, added to `header.timestamp`
    /// once fully known (extended timestamp may still be pending).
    msg_count: u64,
}

impl ChunkStreamState {
    fn new() -> ChunkStreamState {
        ChunkStreamState {
            header: RtmpPacketHeader {
                timestamp: 0,
                format: 0,
                channel_id: 0,
                packet_type: 0,
                stream_id: 0,
                length: 0,
            },
            extended_timestamp: false,
            payload: Vec::new(),
            msg_count: 0,
        }
    }
}

/// Reassembles wire chunks into complete `RtmpPacket`s. Owns the
/// negotiated input chunk size, which the message layer updates whenever
/// it processes a `Set Chunk Size` protocol control message.
pub struct ChunkReader {
    in_chunk_size: usize,
    streams: HashMap<u32, ChunkStreamState>,
    logger: Option<Logger>,
}

impl ChunkReader {
    pub fn new(in_chunk_size: usize) -> ChunkReader {
        ChunkReader {
            in_chunk_size,
            streams: HashMap::new(),
            logger: None,
        }
    }

    pub fn with_logger(in_chunk_size: usize, logger: Logger) -> ChunkReader {
        ChunkReader {
            in_chunk_size,
            streams: HashMap::new(),
            logger: Some(logger),
        }
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.in_chunk_size = size;
    }

    pub fn chunk_size(&self) -> usize {
        self.in_chunk_size
    }

    /// Reads and reassembles chunks until one full message completes, then
    /// returns it. Never returns a partially-read message.
    pub async fn read_packet<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut FastBufferedStream<R>,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<RtmpPacket> {
        loop {
            let (fmt, cid) = self.read_basic_header(stream, deadline, interrupt).await?;

            let state = self
                .streams
                .entry(cid)
                .or_insert_with(ChunkStreamState::new);
            state.header.channel_id = cid;

            // A format-0 chunk always starts a brand new message. If one
            // was already partially assembled on this channel id, the
            // safe policy is to discard it rather than splice unrelated
            // bytes together (see spec.md S9's Open Question).
            if fmt == RTMP_CHUNK_TYPE_0 && !state.payload.is_empty() {
                if let Some(logger) = &self.logger {
                    crate::log_warning!(
                        logger,
                        format!(
                            "discarding {} partially-assembled byte(s) on chunk id {cid}: format-0 arrived before the previous message completed",
                            state.payload.len()
                        )
                    );
                }
                state.payload.clear();
            }

            Self::read_message_header(state, fmt, stream, deadline, interrupt).await?;

            let remaining = state.header.length - state.payload.len();
            let take = remaining.min(self.in_chunk_size.max(1));

            let fragment = stream.read_slice(take, deadline, interrupt).await?;
            state.payload.extend_from_slice(&fragment);

            if state.payload.len() >= state.header.length {
                state.msg_count += 1;

                let packet = RtmpPacket {
                    header: state.header.clone(),
                    clock: state.header.timestamp,
                    bytes: state.payload.len(),
                    handled: false,
                    used: false,
                    payload: std::mem::take(&mut state.payload),
                };

                return Ok(packet);
            }
        }
    }

    async fn read_basic_header<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut FastBufferedStream<R>,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<(u32, u32)> {
        let b0 = stream.read_u8(deadline, interrupt).await?;
        let fmt = (b0 >> 6) as u32;
        let cid_field = b0 & 0x3f;

        let cid = match cid_field {
            0 => {
                let b1 = stream.read_u8(deadline, interrupt).await?;
                b1 as u32 + 64
            }
            1 => {
                let b1 = stream.read_u8(deadline, interrupt).await?;
                let b2 = stream.read_u8(deadline, interrupt).await?;
                b1 as u32 + (b2 as u32) * 256 + 64
            }
            other => other as u32,
        };

        Ok((fmt, cid))
    }

    async fn read_message_header<R: AsyncRead + Unpin>(
        state: &mut ChunkStreamState,
        fmt: u32,
        stream: &mut FastBufferedStream<R>,
        deadline: Deadline,
        interrupt: &Interrupt,
    ) -> Result<()> {
        // A format-3 chunk starting a brand new message (not continuing a
        // partial payload) just repeats the last complete header verbatim.
        let continuing_partial = !state.payload.is_empty();

        if fmt == RTMP_CHUNK_TYPE_3 {
            if state.extended_timestamp && !continuing_partial {
                let ext = stream.read_slice(4, deadline, interrupt).await?;
                state.header.timestamp = BigEndian::read_u32(&ext) as i64;
            } else if state.extended_timestamp {
                // mid-payload continuation chunks for a message that used
                // an extended timestamp repeat the same 4 bytes; skip them.
                stream.skip(4, deadline, interrupt).await?;
            }
            return Ok(());
        }

        let mut timestamp_field: i64;

        if fmt == RTMP_CHUNK_TYPE_0 {
            let ts_bytes = stream.read_slice(3, deadline, interrupt).await?;
            timestamp_field = be24(&ts_bytes);

            let len_bytes = stream.read_slice(3, deadline, interrupt).await?;
            state.header.length = be24(&len_bytes) as usize;

            state.header.packet_type = stream.read_u8(deadline, interrupt).await? as u32;

            let sid_bytes = stream.read_slice(4, deadline, interrupt).await?;
            state.header.stream_id = u32::from_le_bytes([
                sid_bytes[0],
                sid_bytes[1],
                sid_bytes[2],
                sid_bytes[3],
            ]);

            state.extended_timestamp = timestamp_field == EXTENDED_TIMESTAMP_MARKER;
            if state.extended_timestamp {
                let ext = stream.read_slice(4, deadline, interrupt).await?;
                timestamp_field = BigEndian::read_u32(&ext) as i64;
            }

            state.header.timestamp = timestamp_field;
        } else if fmt == RTMP_CHUNK_TYPE_1 {
            let ts_bytes = stream.read_slice(3, deadline, interrupt).await?;
            timestamp_field = be24(&ts_bytes);

            let len_bytes = stream.read_slice(3, deadline, interrupt).await?;
            state.header.length = be24(&len_bytes) as usize;

            state.header.packet_type = stream.read_u8(deadline, interrupt).await? as u32;

            state.extended_timestamp = timestamp_field == EXTENDED_TIMESTAMP_MARKER;
            if state.extended_timestamp {
                let ext = stream.read_slice(4, deadline, interrupt).await?;
                timestamp_field = BigEndian::read_u32(&ext) as i64;
            }

            state.header.timestamp = state.header.timestamp.wrapping_add(timestamp_field);
        } else {
            // RTMP_CHUNK_TYPE_2
            let ts_bytes = stream.read_slice(3, deadline, interrupt).await?;
            timestamp_field = be24(&ts_bytes);

            state.extended_timestamp = timestamp_field == EXTENDED_TIMESTAMP_MARKER;
            if state.extended_timestamp {
                let ext = stream.read_slice(4, deadline, interrupt).await?;
                timestamp_field = BigEndian::read_u32(&ext) as i64;
            }

            state.header.timestamp = state.header.timestamp.wrapping_add(timestamp_field);
        }

        state.header.format = fmt;

        if state.header.length > 16 * 1024 * 1024 {
            return Err(Error::protocol("chunk message length exceeds sanity limit"));
        }

        Ok(())
    }
}

fn be24(b: &[u8]) -> i64 {
    ((b[0] as i64) << 16) | ((b[1] as i64) << 8) | (b[2] as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::spawn;

    async fn harness() -> Interrupt {
        let t = spawn(|i| async move { i });
        t.join().await.unwrap()
    }

    fn encode_fmt0(channel_id: u32, packet_type: u32, stream_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut packet = RtmpPacket::new_blank();
        packet.header.format = RTMP_CHUNK_TYPE_0;
        packet.header.channel_id = channel_id;
        packet.header.packet_type = packet_type;
        packet.header.stream_id = stream_id;
        packet.payload = payload.to_vec();
        packet.header.length = payload.len();
        packet.create_chunks(128)
    }

    #[tokio::test]
    async fn test_reads_single_fmt0_chunk() {
        let interrupt = harness().await;
        let wire = encode_fmt0(3, 20, 0, b"hello world");

        let mut stream = FastBufferedStream::new(&wire[..]);
        let mut reader = ChunkReader::new(128);

        let packet = reader
            .read_packet(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();

        assert_eq!(packet.payload, b"hello world");
        assert_eq!(packet.header.packet_type, 20);
        assert_eq!(packet.header.channel_id, 3);
    }

    #[tokio::test]
    async fn test_reads_chunk_split_across_fmt3_continuations() {
        let interrupt = harness().await;
        let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let wire = encode_fmt0(4, 9, 1, &payload);

        let mut stream = FastBufferedStream::new(&wire[..]);
        let mut reader = ChunkReader::new(128);

        let packet = reader
            .read_packet(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();

        assert_eq!(packet.payload, payload);
    }

    #[tokio::test]
    async fn test_fmt0_hard_resets_partial_message_on_same_channel() {
        let interrupt = harness().await;

        // A fmt0 chunk announcing a 300-byte message, but only the first
        // wire chunk (128 bytes of payload, plus its basic+message
        // header) arrives...
        let header_len = RtmpPacket::serialize_basic_header(RTMP_CHUNK_TYPE_0, 4).len()
            + {
                let mut p = RtmpPacket::new_blank();
                p.header.format = RTMP_CHUNK_TYPE_0;
                p.header.length = 300;
                p.header.packet_type = 9;
                p.serialize_chunk_message_header(1).len()
            };
        let full_first = encode_fmt0(4, 9, 1, &vec![1u8; 300]);
        let mut first_wire = full_first[..header_len + 128].to_vec();

        // ...then a brand new fmt0 message starts on the same channel id
        // before the first one ever completed.
        let second = encode_fmt0(4, 9, 1, b"fresh start");
        first_wire.extend_from_slice(&second);

        let mut stream = FastBufferedStream::new(&first_wire[..]);
        let mut reader = ChunkReader::new(128);

        let packet = reader
            .read_packet(&mut stream, Deadline::never(), &interrupt)
            .await
            .unwrap();

        assert_eq!(packet.payload, b"fresh start");
    }
}
