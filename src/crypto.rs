//src/crypto.rs

use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// 32-byte blake2b-256 digest. Doubles as the pool-wide action identifier.
pub type Hash32 = [u8; 32];
/// Raw ed25519 public key bytes.
pub type PublicKey = [u8; 32];

pub const SIGNATURE_LEN: usize = 64;
const ADDR_HEX_LEN: usize = 40;

type Blake2b256 = Blake2b<U32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CryptoError {
    BadPublicKey,
    BadSignature,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::BadPublicKey => write!(f, "malformed public key"),
            CryptoError::BadSignature => write!(f, "signature verification failed"),
        }
    }
}

pub fn blake2b256(data: &[u8]) -> Hash32 {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First 20 bytes of the public key's blake2b-256 digest.
pub fn pubkey_hash(pubkey: &PublicKey) -> [u8; 20] {
    let digest = blake2b256(pubkey);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[..20]);
    out
}

pub fn address_from_pubkey(pubkey: &PublicKey) -> String {
    format!("0x{}", hex::encode(pubkey_hash(pubkey)))
}

// "0x" + 40 hex chars (20-byte pubkey hash)
pub fn is_hex_addr(addr: &str) -> bool {
    let Some(body) = addr.strip_prefix("0x") else {
        return false;
    };
    body.len() == ADDR_HEX_LEN && body.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Verify an ed25519 signature over `msg` against raw public key bytes.
pub fn verify_signature(pubkey: &PublicKey, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(pubkey).map_err(|_| CryptoError::BadPublicKey)?;
    let sig_bytes: [u8; SIGNATURE_LEN] =
        sig.try_into().map_err(|_| CryptoError::BadSignature)?;
    key.verify(msg, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn blake2b256_is_deterministic_and_spreads() {
        let a = blake2b256(b"hello");
        let b = blake2b256(b"hello");
        let c = blake2b256(b"hello!");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derived_address_is_well_formed() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let addr = address_from_pubkey(&key.verifying_key().to_bytes());
        assert!(is_hex_addr(&addr));
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn hex_addr_rejects_bad_shapes() {
        assert!(!is_hex_addr(""));
        assert!(!is_hex_addr("0x"));
        assert!(!is_hex_addr("1234567890123456789012345678901234567890"));
        assert!(!is_hex_addr("0x12345678901234567890123456789012345678zz"));
        assert!(!is_hex_addr("0x123456789012345678901234567890123456789")); // 39 chars
        assert!(is_hex_addr("0x1234567890abcdef1234567890abcdef12345678"));
    }

    #[test]
    fn verify_signature_round_trip() {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let pk = key.verifying_key().to_bytes();
        let msg = b"canonical stream bytes";
        let sig = key.sign(msg).to_bytes().to_vec();

        assert!(verify_signature(&pk, msg, &sig).is_ok());
        assert_eq!(
            verify_signature(&pk, b"tampered", &sig),
            Err(CryptoError::BadSignature)
        );
        assert_eq!(
            verify_signature(&pk, msg, &sig[..63]),
            Err(CryptoError::BadSignature)
        );
    }
}
