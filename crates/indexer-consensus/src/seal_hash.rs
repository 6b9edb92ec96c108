//! Seal-hash construction (spec §4.2 "Seal-hash construction").

use crate::rlp::{encode_bytes, encode_list, encode_u128};
use alloy::primitives::{keccak256, B256};
use indexer_core::types::Block;

/// Computes the message a WBFT seal signs over for `block` at `round`:
///
/// 1. Copy the header; truncate its extra-data to the first 32 vanity
///    bytes.
/// 2. Compute `keccak256(rlp_encode(header'))` — call this `H`.
/// 3. If `round == 0`, the signed message is `H`. Otherwise it is
///    `keccak256(H ∥ round_be_u32)`.
pub fn seal_hash(block: &Block, round: u32) -> B256 {
    let vanity_len = block.extra_data.len().min(32);
    let truncated_extra = &block.extra_data[..vanity_len];

    let encoded = encode_list(&[
        encode_bytes(block.parent_hash.as_slice()),
        encode_bytes(block.proposer.as_slice()),
        encode_u128(block.number as u128),
        encode_u128(block.timestamp as u128),
        encode_u128(block.gas_used as u128),
        encode_u128(block.gas_limit as u128),
        encode_bytes(truncated_extra),
    ]);
    let h = keccak256(encoded);

    if round == 0 {
        h
    } else {
        let mut buf = Vec::with_capacity(32 + 4);
        buf.extend_from_slice(h.as_slice());
        buf.extend_from_slice(&round.to_be_bytes());
        keccak256(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, Bytes};

    fn sample_block(extra_data: Bytes) -> Block {
        Block {
            number: 10,
            hash: b256!("0000000000000000000000000000000000000000000000000000000000000001"),
            parent_hash: b256!("0000000000000000000000000000000000000000000000000000000000000002"),
            proposer: address!("1111111111111111111111111111111111111111"),
            timestamp: 1_700_000_000,
            gas_used: 21_000,
            gas_limit: 30_000_000,
            extra_data,
            transactions: vec![],
        }
    }

    #[test]
    fn round_zero_is_the_bare_header_hash() {
        let block = sample_block(Bytes::from(vec![0u8; 32]));
        let h0 = seal_hash(&block, 0);
        let direct = {
            let encoded = encode_list(&[
                encode_bytes(block.parent_hash.as_slice()),
                encode_bytes(block.proposer.as_slice()),
                encode_u128(block.number as u128),
                encode_u128(block.timestamp as u128),
                encode_u128(block.gas_used as u128),
                encode_u128(block.gas_limit as u128),
                encode_bytes(&block.extra_data[..32]),
            ]);
            keccak256(encoded)
        };
        assert_eq!(h0, direct);
    }

    #[test]
    fn nonzero_round_rehashes_with_round_suffix() {
        let block = sample_block(Bytes::from(vec![0u8; 40]));
        let h0 = seal_hash(&block, 0);
        let h1 = seal_hash(&block, 1);
        assert_ne!(h0, h1);
    }

    #[test]
    fn extra_data_longer_than_vanity_is_truncated() {
        let short = sample_block(Bytes::from(vec![7u8; 32]));
        let mut long_extra = vec![7u8; 32];
        long_extra.extend_from_slice(&[9u8; 50]);
        let long = sample_block(Bytes::from(long_extra));
        assert_eq!(seal_hash(&short, 0), seal_hash(&long, 0));
    }
}
