// Complex handshake: HMAC-SHA256 digest validation (schema 0/1) plus a real
// Diffie-Hellman key exchange embedded in the key block (spec.md S4.7).
//
// Layout (srs_core_handshake.cpp key_block/digest_block): C1/S1 is 1536
// bytes = 8B (time, version) + two 764-byte blocks. Schema 1 orders them
// digest-block-then-key-block; schema 0 orders them key-block-then-digest-
// block. A digest block's 4-byte offset field is its own first 4 bytes and
// selects a 32-byte digest inside the remaining 760; a key block's offset
// field is its own LAST 4 bytes and selects a 128-byte DH public key inside
// the remaining 760.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use rand::{rngs::StdRng, RngCore, SeedableRng};

use std::sync::LazyLock;

use crate::error::{Error, ErrorKind, Result};
use crate::log::Logger;
use crate::log_debug;

use super::dh::DhKeyPair;
use super::{
    GENUINE_FMS, GENUINE_FP, MESSAGE_FORMAT_0, MESSAGE_FORMAT_1, MESSAGE_FORMAT_2, RANDOM_CRUD,
    RTMP_SIG_SIZE, RTMP_VERSION, SHA256DL, SHA256K,
};

const BLOCK_SIZE: usize = 764;
const DIGEST_OFFSET_MODULUS: usize = BLOCK_SIZE - SHA256DL - 4; // 728
const KEY_OFFSET_MODULUS: usize = BLOCK_SIZE - SHA256K - 4; // 632

static GENUINE_FMS_PLUS_CRUD: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let mut v = GENUINE_FMS.as_bytes().to_vec();
    v.extend_from_slice(RANDOM_CRUD);
    v
});

/// Result of a successful handshake: the response bytes, and the shared
/// secret when the client carried a DH key block (schema 1/2 only).
pub struct HandshakeOutcome {
    pub response: Vec<u8>,
    pub shared_secret: Option<[u8; SHA256K]>,
}

fn sum_mod(buf: &[u8], modulus: usize) -> usize {
    let sum = buf[0] as usize + buf[1] as usize + buf[2] as usize + buf[3] as usize;
    sum % modulus
}

/// Digest offset within a 1536-byte buffer, for the schema whose digest
/// block comes first (schema 1: digest block at \[8..772), offset field at
/// its first 4 bytes, buf\[8..12\]).
fn digest_offset_schema1(buf: &[u8]) -> usize {
    8 + 4 + sum_mod(&buf[8..12], DIGEST_OFFSET_MODULUS)
}

/// Digest offset for the schema whose digest block comes second (schema 0:
/// digest block at \[772..1536), offset field at buf\[772..776\]).
fn digest_offset_schema0(buf: &[u8]) -> usize {
    772 + 4 + sum_mod(&buf[772..776], DIGEST_OFFSET_MODULUS)
}

/// Key offset for schema 1 (key block second, at \[772..1536); its offset
/// field is the block's last 4 bytes, buf\[1532..1536\]).
fn key_offset_schema1(buf: &[u8]) -> usize {
    772 + sum_mod(&buf[1532..1536], KEY_OFFSET_MODULUS)
}

/// Key offset for schema 0 (key block first, at \[8..772); its offset field
/// is the block's last 4 bytes, buf\[768..772\]).
fn key_offset_schema0(buf: &[u8]) -> usize {
    8 + sum_mod(&buf[768..772], KEY_OFFSET_MODULUS)
}

fn digest_offset(msg_format: u32, buf: &[u8]) -> usize {
    if msg_format == MESSAGE_FORMAT_1 {
        digest_offset_schema1(buf)
    } else {
        digest_offset_schema0(buf)
    }
}

fn key_offset(msg_format: u32, buf: &[u8]) -> usize {
    if msg_format == MESSAGE_FORMAT_1 {
        key_offset_schema1(buf)
    } else {
        key_offset_schema0(buf)
    }
}

/// Generates the full S0|S1|S2 response to a client's C1 signature
pub fn generate_s0_s1_s2(client_signature: &[u8], logger: &Logger) -> Result<HandshakeOutcome> {
    let msg_format = detect_client_message_format(client_signature, logger)?;

    let mut response = Vec::with_capacity(1 + 2 * RTMP_SIG_SIZE);
    let mut shared_secret = None;

    if msg_format == MESSAGE_FORMAT_0 {
        log_debug!(logger, "using basic handshake");

        response.push(RTMP_VERSION);
        response.extend(client_signature);
        response.extend(client_signature);
    } else {
        log_debug!(logger, "using complex handshake");

        let (s1, secret) = generate_s1(msg_format, client_signature, logger)?;
        let s2 = generate_s2(msg_format, client_signature, logger)?;

        response.push(RTMP_VERSION);
        response.extend(s1);
        response.extend(s2);
        shared_secret = Some(secret);
    }

    Ok(HandshakeOutcome {
        response,
        shared_secret,
    })
}

/// Generates S1: random payload carrying our DH public key and digest,
/// laid out in the same schema the client used. Returns the bytes to send
/// plus the shared secret derived from the client's DH public key.
fn generate_s1(
    msg_format: u32,
    client_signature: &[u8],
    logger: &Logger,
) -> Result<(Vec<u8>, [u8; SHA256K])> {
    let mut buf = vec![0u8; RTMP_SIG_SIZE];
    let mut rng = StdRng::from_os_rng();
    rng.fill_bytes(&mut buf[8..]);
    buf[0..8].copy_from_slice(&[0, 0, 0, 0, 1, 2, 3, 4]);

    let our_key = DhKeyPair::generate();
    let key_at = key_offset(msg_format, &buf);
    buf[key_at..key_at + SHA256K].copy_from_slice(&our_key.public);

    let client_key_at = key_offset(msg_format, client_signature);
    let client_public = &client_signature[client_key_at..client_key_at + SHA256K];
    let shared_secret = our_key.compute_shared_secret(client_public);

    let digest_at = digest_offset(msg_format, &buf);
    if buf.len() < digest_at + SHA256DL {
        log_debug!(logger, "s1 buffer too small for digest slot");
        return Err(Error::new(ErrorKind::Handshake, "s1 buffer too small for digest slot"));
    }

    let mut msg = buf[0..digest_at].to_vec();
    msg.extend(&buf[digest_at + SHA256DL..]);

    let digest = calc_hmac(&msg, GENUINE_FMS.as_bytes());
    buf[digest_at..digest_at + SHA256DL].copy_from_slice(&digest);

    Ok((buf, shared_secret))
}

/// Generates S2: 1504 random bytes + an HMAC-SHA256 signature over them,
/// keyed by HMAC-SHA256(client digest, well-known 68-byte server key).
fn generate_s2(msg_format: u32, client_signature: &[u8], logger: &Logger) -> Result<Vec<u8>> {
    if client_signature.len() < RTMP_SIG_SIZE {
        log_debug!(logger, "client signature too small for s2");
        return Err(Error::new(ErrorKind::Handshake, "client signature too small for s2"));
    }

    let mut random_bytes = vec![0u8; RTMP_SIG_SIZE - SHA256DL];
    let mut rng = StdRng::from_os_rng();
    rng.fill_bytes(&mut random_bytes);

    let digest_at = digest_offset(msg_format, client_signature);
    let client_digest = &client_signature[digest_at..digest_at + SHA256DL];

    let temp_key = calc_hmac(client_digest, &GENUINE_FMS_PLUS_CRUD);
    let signature = calc_hmac(&random_bytes, &temp_key);

    let mut s2 = random_bytes;
    s2.extend(signature);
    Ok(s2)
}

fn calc_hmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let mut mac: Hmac<Sha256> = Hmac::new_from_slice(key).expect("HMAC accepts a key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn compare_signatures(sig1: &[u8], sig2: &[u8]) -> bool {
    sig1.len() == sig2.len() && sig1.iter().zip(sig2).all(|(a, b)| a == b)
}

/// Tries schema 0 then schema 1 against the client's C1 using the
/// well-known client key (`GENUINE_FP`); falls back to the basic handshake.
fn detect_client_message_format(client_signature: &[u8], logger: &Logger) -> Result<u32> {
    if client_signature.len() < RTMP_SIG_SIZE {
        log_debug!(logger, "client signature too small to detect schema");
        return Err(Error::new(ErrorKind::Handshake, "client signature too small"));
    }

    for (schema, offset_fn) in [
        (MESSAGE_FORMAT_2, digest_offset_schema0 as fn(&[u8]) -> usize),
        (MESSAGE_FORMAT_1, digest_offset_schema1 as fn(&[u8]) -> usize),
    ] {
        let at = offset_fn(client_signature);
        if client_signature.len() < at + SHA256DL {
            continue;
        }

        let mut msg = client_signature[0..at].to_vec();
        msg.extend(&client_signature[at + SHA256DL..]);

        let computed = calc_hmac(&msg, GENUINE_FP.as_bytes());
        let provided = &client_signature[at..at + SHA256DL];

        if compare_signatures(&computed, provided) {
            return Ok(schema);
        }
    }

    log_debug!(logger, "neither schema validated, falling back to basic handshake");
    Ok(MESSAGE_FORMAT_0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_c1() -> Vec<u8> {
        let mut rng = StdRng::from_os_rng();
        let mut buf = vec![0u8; RTMP_SIG_SIZE];
        rng.fill_bytes(&mut buf);
        buf
    }

    #[test]
    fn test_random_client_falls_back_to_basic_handshake() {
        let logger = Logger::new_disabled();
        let c1 = random_c1();

        let outcome = generate_s0_s1_s2(&c1, &logger).unwrap();
        assert!(outcome.shared_secret.is_none());
        assert_eq!(outcome.response.len(), 1 + RTMP_SIG_SIZE * 2);
    }

    /// Builds a valid schema-0 C1 (key block then digest block) with a
    /// real DH public key, the way FMLE/Flash Player actually construct one.
    fn build_complex_c1() -> (Vec<u8>, DhKeyPair) {
        let mut rng = StdRng::from_os_rng();
        let mut c1 = vec![0u8; RTMP_SIG_SIZE];
        rng.fill_bytes(&mut c1[8..]);
        c1[0..8].copy_from_slice(&[0x80, 0x00, 0x07, 0x02, 1, 2, 3, 4]);

        let client_key = DhKeyPair::generate();
        let key_at = key_offset_schema0(&c1);
        c1[key_at..key_at + SHA256K].copy_from_slice(&client_key.public);

        let digest_at = digest_offset_schema0(&c1);
        let mut msg = c1[0..digest_at].to_vec();
        msg.extend(&c1[digest_at + SHA256DL..]);
        let digest = calc_hmac(&msg, GENUINE_FP.as_bytes());
        c1[digest_at..digest_at + SHA256DL].copy_from_slice(&digest);

        (c1, client_key)
    }

    #[test]
    fn test_complex_client_schema0_derives_matching_shared_secret() {
        let logger = Logger::new_disabled();
        let (c1, client_key) = build_complex_c1();

        let outcome = generate_s0_s1_s2(&c1, &logger).unwrap();
        let server_secret = outcome.shared_secret.expect("complex handshake should derive a secret");

        let s1 = &outcome.response[1..1 + RTMP_SIG_SIZE];
        let server_key_at = key_offset_schema0(s1);
        let server_public = &s1[server_key_at..server_key_at + SHA256K];
        let client_secret = client_key.compute_shared_secret(server_public);

        assert_eq!(server_secret, client_secret);
    }
}
