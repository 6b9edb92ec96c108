//! ECDSA sender/authority recovery (spec §3.1 "Tx-from-tx mapping" and
//! "SetCodeAuthorization"). An Ethereum address is the low 20 bytes of
//! `keccak256` of the uncompressed secp256k1 public key recovered from a
//! signature over a (tx-type-specific) signing hash. Construction of that
//! signing hash is chain/tx-type specific wire detail and is left to the
//! RPC adapter (spec §9 Open Questions: extraction specifics are
//! adapter-level); this module owns only the cryptographic primitive.

use alloy::primitives::{keccak256, Address, B256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};

/// Recovers the signing address from `message_hash` given a signature's
/// `(r, s, y_parity)`. Returns `None` on any malformed input or recovery
/// failure; callers treat that as "sender is the zero address" (tx
/// recovery) or "authorization not applied" (EIP-7702), per spec §3.1 and
/// §4.1 "Tx-from-tx mapping".
pub fn recover_address(message_hash: B256, r: &[u8; 32], s: &[u8; 32], y_parity: u8) -> Option<Address> {
    if y_parity > 1 {
        return None;
    }
    let recovery_id = RecoveryId::from_i32(y_parity as i32).ok()?;
    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(r);
    sig_bytes[32..].copy_from_slice(s);
    let signature = RecoverableSignature::from_compact(&sig_bytes, recovery_id).ok()?;
    let message = Message::from_digest(message_hash.0);
    let public_key = Secp256k1::verification_only().recover_ecdsa(&message, &signature).ok()?;
    address_from_public_key(&public_key)
}

fn address_from_public_key(public_key: &secp256k1::PublicKey) -> Option<Address> {
    let uncompressed = public_key.serialize_uncompressed();
    // `uncompressed[0]` is the 0x04 tag; the address is the low 20 bytes
    // of keccak256(x || y).
    let hash = keccak256(&uncompressed[1..]);
    Some(Address::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::rand;
    use secp256k1::SecretKey;

    #[test]
    fn recovers_the_signing_address() {
        let secp = Secp256k1::new();
        let secret = SecretKey::new(&mut rand::thread_rng());
        let public = secp256k1::PublicKey::from_secret_key(&secp, &secret);
        let digest = keccak256(b"wbft seal hash fixture");
        let message = Message::from_digest(digest.0);
        let (recovery_id, sig_bytes) = secp.sign_ecdsa_recoverable(&message, &secret).serialize_compact();
        let r: [u8; 32] = sig_bytes[..32].try_into().unwrap();
        let s: [u8; 32] = sig_bytes[32..].try_into().unwrap();

        let recovered = recover_address(digest, &r, &s, recovery_id.to_i32() as u8).unwrap();
        assert_eq!(recovered, address_from_public_key(&public).unwrap());
    }

    #[test]
    fn out_of_range_y_parity_is_rejected() {
        assert!(recover_address(B256::ZERO, &[0u8; 32], &[0u8; 32], 2).is_none());
    }

    #[test]
    fn garbage_signature_fails_to_recover() {
        let digest = keccak256(b"garbage");
        assert!(recover_address(digest, &[0xFFu8; 32], &[0xFFu8; 32], 0).is_none());
    }
}
