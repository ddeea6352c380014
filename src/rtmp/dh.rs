// Diffie-Hellman key exchange for the complex handshake key block.
//
// `original_source` drives this through OpenSSL's `DH_generate_key`/
// `DH_compute_key` against a fixed 1024-bit group. This crate's dependency
// stack carries no DH primitive, so the exchange is reimplemented directly
// on `num-bigint`'s modexp - the group is the standard Adobe/RTMP 1024-bit
// MODP group (RFC 2409 Group 2), generator 2.

use num_bigint::BigUint;
use rand::{rngs::StdRng, RngCore, SeedableRng};

use super::constants::SHA256K;

const DH_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406",
    "B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE",
    "65381FFFFFFFFFFFFFFFF",
);

const DH_GENERATOR: u32 = 2;

/// One side's DH key pair
pub struct DhKeyPair {
    private: BigUint,
    pub public: [u8; SHA256K],
}

impl DhKeyPair {
    /// Generates a fresh key pair with a random 1024-bit-ish private exponent
    pub fn generate() -> DhKeyPair {
        let prime = dh_prime();
        let generator = BigUint::from(DH_GENERATOR);

        let mut rng = StdRng::from_os_rng();
        let mut private_bytes = [0u8; SHA256K];
        rng.fill_bytes(&mut private_bytes);
        let private = BigUint::from_bytes_be(&private_bytes);

        let public = generator.modpow(&private, &prime);
        DhKeyPair {
            private,
            public: to_fixed_width(&public),
        }
    }

    /// Derives the shared secret from the peer's public key bytes
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> [u8; SHA256K] {
        let prime = dh_prime();
        let peer = BigUint::from_bytes_be(peer_public);
        let shared = peer.modpow(&self.private, &prime);
        to_fixed_width(&shared)
    }
}

fn dh_prime() -> BigUint {
    BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16).expect("DH prime is a fixed valid hex literal")
}

fn to_fixed_width(value: &BigUint) -> [u8; SHA256K] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; SHA256K];
    if bytes.len() >= SHA256K {
        out.copy_from_slice(&bytes[bytes.len() - SHA256K..]);
    } else {
        out[SHA256K - bytes.len()..].copy_from_slice(&bytes);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret_agrees() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();

        let alice_shared = alice.compute_shared_secret(&bob.public);
        let bob_shared = bob.compute_shared_secret(&alice.public);

        assert_eq!(alice_shared, bob_shared);
    }
}
