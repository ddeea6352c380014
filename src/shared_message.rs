// Shared-payload message: one producer (the publisher session) decodes a
// frame once; every subscribed player session holds its own handle onto
// the same payload bytes instead of each getting its own copy. Builds on
// `rtmp::RtmpPacket`, the teacher's per-connection message unit.

use std::sync::Arc;

use crate::rtmp::{RtmpPacket, RtmpPacketHeader};

/// A reference-counted handle onto one decoded message's payload.
///
/// `header` is value-copied into every handle produced by `copy()`, so a
/// player session can retarget `stream_id` or rebase the timestamp for
/// its own chunk stream without racing any other subscriber holding the
/// same payload.
#[derive(Clone)]
pub struct SharedMessage {
    pub header: RtmpPacketHeader,
    payload: Arc<Vec<u8>>,
}

impl SharedMessage {
    /// Steals the payload out of `common_message`, leaving it empty.
    pub fn create(mut common_message: RtmpPacket) -> SharedMessage {
        let payload = std::mem::take(&mut common_message.payload);
        SharedMessage {
            header: common_message.header,
            payload: Arc::new(payload),
        }
    }

    /// Returns a new handle sharing the same payload allocation. The
    /// refcount is incremented; it is decremented when the returned
    /// handle (or any clone of it) is dropped.
    pub fn copy(&self) -> SharedMessage {
        SharedMessage {
            header: self.header.clone(),
            payload: self.payload.clone(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of live handles onto this payload allocation.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.payload)
    }

    /// Serializes this message into wire chunks for `stream_id`, without
    /// disturbing the shared payload or any other handle's header.
    pub fn create_chunks_for_stream(&self, stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
        let packet = RtmpPacket {
            header: self.header.clone(),
            clock: self.header.timestamp,
            bytes: self.payload.len(),
            handled: false,
            used: false,
            payload: (*self.payload).clone(),
        };

        packet.create_chunks_for_stream(stream_id, out_chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet(payload: &[u8]) -> RtmpPacket {
        let mut packet = RtmpPacket::new_blank();
        packet.header.channel_id = 6;
        packet.header.packet_type = 18;
        packet.header.stream_id = 1;
        packet.header.length = payload.len();
        packet.payload = payload.to_vec();
        packet
    }

    #[test]
    fn test_create_steals_payload() {
        let packet = sample_packet(b"frame-bytes");
        let shared = SharedMessage::create(packet);
        assert_eq!(shared.payload(), b"frame-bytes");
    }

    #[test]
    fn test_copy_shares_payload_independent_header() {
        let packet = sample_packet(b"video-frame");
        let shared = SharedMessage::create(packet);

        let mut for_player_a = shared.copy();
        let for_player_b = shared.copy();

        for_player_a.header.stream_id = 42;

        assert_eq!(for_player_a.header.stream_id, 42);
        assert_eq!(for_player_b.header.stream_id, shared.header.stream_id);
        assert_eq!(for_player_a.payload(), for_player_b.payload());
    }

    #[test]
    fn test_refcount_tracks_live_handles() {
        let packet = sample_packet(b"x");
        let shared = SharedMessage::create(packet);
        assert_eq!(shared.refcount(), 1);

        let copy = shared.copy();
        assert_eq!(shared.refcount(), 2);

        drop(copy);
        assert_eq!(shared.refcount(), 1);
    }

    #[test]
    fn test_create_chunks_for_stream_does_not_mutate_shared_header() {
        let packet = sample_packet(b"abc");
        let shared = SharedMessage::create(packet);

        let wire = shared.create_chunks_for_stream(7, 128);
        assert!(!wire.is_empty());
        assert_eq!(shared.header.stream_id, 1);
    }
}
