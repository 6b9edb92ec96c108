//! WBFT consensus decoding and BLS seal verification (spec §4.2).
//!
//! This crate turns a block's opaque `extra_data` into a `ConsensusData`
//! record and, optionally, verifies the committed seal's aggregated BLS
//! signature. It has no storage or RPC dependency of its own: callers in
//! `indexer-ingestion` own persistence and event publication.

pub mod bls;
pub mod decoder;
pub mod registry;
pub mod rlp;
pub mod seal_hash;
pub mod validator_cache;

use bls::{verify_seal, BlsError, SealVerification};
use decoder::{extract_signers, extract_validators, parse_extra, DecoderError};
use indexer_core::consensus_types::{ConsensusData, ConsensusSeverity, EpochInfo};
use indexer_core::types::Block;
use thiserror::Error;
pub use validator_cache::ValidatorSetCache;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Decode(#[from] DecoderError),
    #[error("bls verification setup failed: {0}")]
    Bls(#[from] BlsError),
}

/// Tuning knobs for one chain's WBFT processing (spec §3.2, §4.2).
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub epoch_length: u64,
    pub min_participation_pct: f64,
    pub skip_verification: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self { epoch_length: 30_000, min_participation_pct: 66.67, skip_verification: false }
    }
}

/// The full result of processing one block's consensus metadata: the
/// flattened `ConsensusData` plus the committed-seal verification outcome
/// and, if the inner RLP failed to decode, the reason (spec §9 Open
/// Questions: surfaced distinctly rather than only logged).
#[derive(Debug, Clone)]
pub struct ParsedConsensus {
    pub data: Option<ConsensusData>,
    pub committed_verification: Option<SealVerification>,
    pub decode_error: Option<String>,
    pub severity: Option<ConsensusSeverity>,
}

/// Parses `block`'s extra-data, derives `ConsensusData`, and verifies the
/// committed seal (spec §4.1 step 3, §4.2). Returns `data: None` when the
/// extra-data degrades to vanity-only — the pipeline then treats the
/// block as carrying no consensus data, per the decoder's failure model.
///
/// Uses a throwaway, per-call `ValidatorSetCache`: every call only ever
/// sees one block, so there is nothing to carry forward. Callers that
/// process a chain's blocks in sequence must use [`process_block`]
/// directly with a cache that outlives the call, or non-boundary blocks
/// will report an empty validator set (spec §3.5).
pub fn parse_consensus_wbft(
    block: &Block,
    validator_cache: &ValidatorSetCache,
) -> Result<ParsedConsensus, ConsensusError> {
    process_block(block, &ConsensusConfig::default(), validator_cache)
}

/// Same as [`parse_consensus_wbft`] but with explicit tuning, used by
/// `indexer-ingestion` once a chain's configuration is known.
///
/// `validator_cache` carries the most recently announced `EpochInfo`
/// forward by epoch number (spec §3.5): `epoch_info` is only present on
/// epoch-boundary blocks, so every ordinary block in between looks up the
/// set announced at its epoch's boundary instead of decoding an empty one
/// from its own extra-data.
pub fn process_block(
    block: &Block,
    config: &ConsensusConfig,
    validator_cache: &ValidatorSetCache,
) -> Result<ParsedConsensus, ConsensusError> {
    let (extra, decode_err) = parse_extra(Some(&block.extra_data))?;

    let Some(inner) = extra.inner else {
        return Ok(ParsedConsensus {
            data: None,
            committed_verification: None,
            decode_error: decode_err.map(|e| e.to_string()),
            severity: None,
        });
    };

    let epoch_info = inner.epoch_info.clone();
    let active_epoch_info: Option<EpochInfo> = if config.epoch_length == 0 {
        epoch_info.clone()
    } else {
        let epoch_number = block.number / config.epoch_length;
        match &epoch_info {
            Some(info) => {
                validator_cache.insert(epoch_number, info.clone());
                Some(info.clone())
            }
            None => validator_cache.get(epoch_number),
        }
    };
    let validators = active_epoch_info
        .as_ref()
        .map(|e| extract_validators(e))
        .unwrap_or_default();

    let prepare_signers = extract_signers(&inner.prepared_seal, &validators);
    let commit_signers = extract_signers(&inner.committed_seal, &validators);
    let missed_prepare: Vec<_> = validators
        .iter()
        .filter(|v| !prepare_signers.contains(v))
        .copied()
        .collect();
    let missed_commit: Vec<_> = validators
        .iter()
        .filter(|v| !commit_signers.contains(v))
        .copied()
        .collect();

    let is_epoch_boundary = ConsensusData::is_epoch_boundary(block.number, config.epoch_length);

    let data = ConsensusData {
        block_number: block.number,
        block_hash: block.hash,
        proposer: block.proposer,
        round: inner.round,
        prev_round: inner.prev_round,
        validators: validators.clone(),
        prepare_signers,
        commit_signers,
        missed_prepare,
        missed_commit,
        vanity: extra.vanity,
        randao_reveal: inner.randao_reveal,
        gas_tip: inner.gas_tip,
        epoch_info,
        is_epoch_boundary,
        timestamp: block.timestamp,
    };

    let missed_pct = if data.validators.is_empty() {
        0.0
    } else {
        (data.missed_commit.len() as f64 / data.validators.len() as f64) * 100.0
    };
    let severity = if data.round > 0 || data.participation_pct() < config.min_participation_pct {
        ConsensusSeverity::classify(missed_pct, data.participation_pct(), data.round)
    } else {
        None
    };

    let verification = if let Some(info) = &active_epoch_info {
        let message = seal_hash::seal_hash(block, data.round);
        match verify_seal(
            &inner.committed_seal,
            &info.bls_public_keys,
            message.as_slice(),
            config.min_participation_pct,
            config.skip_verification,
        ) {
            Ok(v) => Some(v),
            // Non-fatal per spec §7: annotate with the participation that
            // triggered the rejection instead of discarding it, matching
            // the rest of the pipeline's annotate-and-continue handling.
            Err(BlsError::InsufficientSigners { signer_count, validator_count, participation_pct }) => {
                Some(SealVerification {
                    verified: false,
                    skipped: false,
                    signer_count,
                    validator_count,
                    participation_pct,
                    has_quorum: false,
                })
            }
            Err(_) => None,
        }
    } else {
        None
    };

    Ok(ParsedConsensus {
        data: Some(data),
        committed_verification: verification,
        decode_error: None,
        severity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, Bytes};
    use indexer_core::consensus_types::{Candidate, EpochInfo, Seal, WBFTExtraInner};
    use rlp::{encode_bytes, encode_list, encode_u128, encode_u32};

    fn encode_seal(seal: &Seal) -> Vec<u8> {
        encode_list(&[encode_bytes(&seal.sealers), encode_bytes(&seal.signature)])
    }

    fn encode_epoch_info(info: &EpochInfo) -> Vec<u8> {
        let candidates: Vec<Vec<u8>> = info
            .candidates
            .iter()
            .map(|c| {
                encode_list(&[encode_bytes(c.address.as_slice()), encode_u128(c.diligence as u128)])
            })
            .collect();
        let validators: Vec<Vec<u8>> = info.validators.iter().map(|v| encode_u32(*v)).collect();
        let keys: Vec<Vec<u8>> = info.bls_public_keys.iter().map(|k| encode_bytes(k)).collect();
        encode_list(&[encode_list(&candidates), encode_list(&validators), encode_list(&keys)])
    }

    fn encode_inner(inner: &WBFTExtraInner) -> Vec<u8> {
        let mut items = vec![
            encode_bytes(&inner.randao_reveal),
            encode_u32(inner.prev_round),
            encode_seal(&inner.prev_prepared_seal),
            encode_seal(&inner.prev_committed_seal),
            encode_u32(inner.round),
            encode_seal(&inner.prepared_seal),
            encode_seal(&inner.committed_seal),
            encode_u128(inner.gas_tip),
        ];
        if let Some(epoch_info) = &inner.epoch_info {
            items.push(encode_epoch_info(epoch_info));
        }
        encode_list(&items)
    }

    fn block_with_extra(number: u64, inner: &WBFTExtraInner) -> Block {
        let mut extra = vec![0u8; 32];
        extra.extend(encode_inner(inner));
        Block {
            number,
            hash: b256!("0000000000000000000000000000000000000000000000000000000000000099"),
            parent_hash: b256!("0000000000000000000000000000000000000000000000000000000000000001"),
            proposer: address!("1111111111111111111111111111111111111111"),
            timestamp: 1_700_000_000,
            gas_used: 21_000,
            gas_limit: 30_000_000,
            extra_data: Bytes::from(extra),
            transactions: vec![],
        }
    }

    #[test]
    fn epoch_boundary_scenario_from_literal_test_case() {
        let candidates = vec![
            Candidate { address: address!("1111111111111111111111111111111111111111"), diligence: 1_500_000 },
            Candidate { address: address!("2222222222222222222222222222222222222222"), diligence: 1_400_000 },
            Candidate { address: address!("3333333333333333333333333333333333333333"), diligence: 1_300_000 },
            Candidate { address: address!("4444444444444444444444444444444444444444"), diligence: 1_200_000 },
        ];
        let epoch_info = EpochInfo { candidates, validators: vec![0, 1, 2, 3], bls_public_keys: vec![[0u8; 48]; 4] };
        let inner = WBFTExtraInner {
            randao_reveal: vec![],
            prev_round: 0,
            prev_prepared_seal: Seal::default(),
            prev_committed_seal: Seal::default(),
            round: 0,
            prepared_seal: Seal::default(),
            committed_seal: Seal::default(),
            gas_tip: 0,
            epoch_info: Some(epoch_info),
        };
        let block = block_with_extra(10, &inner);
        let config = ConsensusConfig { epoch_length: 10, ..Default::default() };
        let cache = ValidatorSetCache::new();
        let parsed = process_block(&block, &config, &cache).unwrap();
        let data = parsed.data.unwrap();
        assert!(data.is_epoch_boundary);
        assert_eq!(data.validators.len(), 4);
        assert_eq!(data.epoch_info.unwrap().candidates.len(), 4);
    }

    #[test]
    fn vanity_only_block_yields_no_consensus_data() {
        let extra = vec![0u8; 32];
        let block = Block {
            number: 5,
            hash: b256!("0000000000000000000000000000000000000000000000000000000000000005"),
            parent_hash: b256!("0000000000000000000000000000000000000000000000000000000000000001"),
            proposer: address!("1111111111111111111111111111111111111111"),
            timestamp: 1,
            gas_used: 0,
            gas_limit: 0,
            extra_data: Bytes::from(extra),
            transactions: vec![],
        };
        let cache = ValidatorSetCache::new();
        let parsed = process_block(&block, &ConsensusConfig::default(), &cache).unwrap();
        assert!(parsed.data.is_none());
        assert!(parsed.decode_error.is_some());
    }

    #[test]
    fn low_participation_is_flagged_critical() {
        let candidates: Vec<_> = (0..3)
            .map(|i| Candidate { address: alloy::primitives::Address::with_last_byte(i), diligence: 1 })
            .collect();
        let epoch_info = EpochInfo { candidates, validators: vec![0, 1, 2], bls_public_keys: vec![[0u8; 48]; 3] };
        let inner = WBFTExtraInner {
            randao_reveal: vec![],
            prev_round: 0,
            prev_prepared_seal: Seal::default(),
            prev_committed_seal: Seal::default(),
            round: 0,
            prepared_seal: Seal::default(),
            committed_seal: Seal { sealers: vec![0b0000_0001], signature: [0u8; 96] },
            gas_tip: 0,
            epoch_info: Some(epoch_info),
        };
        let block = block_with_extra(11, &inner);
        let cache = ValidatorSetCache::new();
        let parsed = process_block(&block, &ConsensusConfig::default(), &cache).unwrap();
        let data = parsed.data.unwrap();
        assert_eq!(data.commit_signers.len(), 1);
        assert_eq!(parsed.severity, Some(ConsensusSeverity::Critical));
    }

    /// A block that committed at `round > 0` but with every validator
    /// signing the committed seal must still be flagged (spec §4.1 step 3:
    /// "if participation < 67% or round > 0"); extra rounds were needed
    /// to reach quorum even though the final tally looks clean.
    #[test]
    fn full_participation_at_nonzero_round_is_still_flagged() {
        let candidates: Vec<_> = (0..3)
            .map(|i| Candidate { address: alloy::primitives::Address::with_last_byte(i), diligence: 1 })
            .collect();
        let epoch_info = EpochInfo { candidates, validators: vec![0, 1, 2], bls_public_keys: vec![[0u8; 48]; 3] };
        let inner = WBFTExtraInner {
            randao_reveal: vec![],
            prev_round: 0,
            prev_prepared_seal: Seal::default(),
            prev_committed_seal: Seal::default(),
            round: 1,
            prepared_seal: Seal::default(),
            committed_seal: Seal { sealers: vec![0b0000_0111], signature: [0u8; 96] },
            gas_tip: 0,
            epoch_info: Some(epoch_info),
        };
        let block = block_with_extra(11, &inner);
        let cache = ValidatorSetCache::new();
        let parsed = process_block(&block, &ConsensusConfig::default(), &cache).unwrap();
        let data = parsed.data.unwrap();
        assert_eq!(data.commit_signers.len(), 3);
        assert_eq!(data.validators.len(), 3);
        assert_eq!(parsed.severity, Some(ConsensusSeverity::Low));
    }

    /// Regression test for the bug where every non-boundary block reported
    /// zero validators: a boundary block populates the cache, and the very
    /// next (non-boundary) block within the same epoch must reuse it rather
    /// than degrade to an empty validator set and a spurious Critical
    /// severity.
    #[test]
    fn non_boundary_block_reuses_validator_set_from_cache() {
        let candidates: Vec<_> = (0..3)
            .map(|i| Candidate { address: alloy::primitives::Address::with_last_byte(i), diligence: 1 })
            .collect();
        let epoch_info = EpochInfo { candidates, validators: vec![0, 1, 2], bls_public_keys: vec![[0u8; 48]; 3] };
        let boundary_inner = WBFTExtraInner {
            randao_reveal: vec![],
            prev_round: 0,
            prev_prepared_seal: Seal::default(),
            prev_committed_seal: Seal::default(),
            round: 0,
            prepared_seal: Seal::default(),
            committed_seal: Seal { sealers: vec![0b0000_0111], signature: [0u8; 96] },
            gas_tip: 0,
            epoch_info: Some(epoch_info),
        };
        let config = ConsensusConfig { epoch_length: 10, ..Default::default() };
        let cache = ValidatorSetCache::new();

        let boundary_block = block_with_extra(10, &boundary_inner);
        let boundary_parsed = process_block(&boundary_block, &config, &cache).unwrap();
        assert_eq!(boundary_parsed.data.unwrap().validators.len(), 3);
        assert_eq!(cache.len(), 1);

        let follow_up_inner = WBFTExtraInner {
            randao_reveal: vec![],
            prev_round: 0,
            prev_prepared_seal: Seal::default(),
            prev_committed_seal: Seal::default(),
            round: 0,
            prepared_seal: Seal::default(),
            committed_seal: Seal { sealers: vec![0b0000_0111], signature: [0u8; 96] },
            gas_tip: 0,
            epoch_info: None,
        };
        let follow_up_block = block_with_extra(11, &follow_up_inner);
        let follow_up_parsed = process_block(&follow_up_block, &config, &cache).unwrap();
        let data = follow_up_parsed.data.unwrap();
        assert!(!data.is_epoch_boundary);
        assert!(data.epoch_info.is_none());
        assert_eq!(data.validators, vec![0, 1, 2]);
        assert_eq!(data.commit_signers.len(), 3);
        assert_ne!(follow_up_parsed.severity, Some(ConsensusSeverity::Critical));
    }
}
