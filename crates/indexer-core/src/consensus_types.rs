//! WBFT consensus entities (spec §3.2). The wire-format decoder and the
//! BLS verifier live in `indexer-consensus`; the derived data shapes live
//! here so `indexer-ingestion` and `indexer-core::storage` can reference
//! them without depending on the decoder crate.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// One phase's aggregated seal: a validator bitmap plus a 96-byte
/// aggregated BLS signature (spec §3.2, §6 wire format).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Seal {
    pub sealers: Vec<u8>,
    pub signature: [u8; 96],
}

impl Seal {
    /// Bit `i` of byte `i/8` (spec §3.2 invariants, §6 "Sealers bitmap").
    pub fn signed(&self, index: usize) -> bool {
        let byte = index / 8;
        let bit = index % 8;
        self.sealers
            .get(byte)
            .is_some_and(|b| b & (1 << bit) != 0)
    }
}

/// One epoch-boundary candidate (spec §3.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub address: Address,
    pub diligence: u64,
}

/// Present only at epoch boundaries (spec §3.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EpochInfo {
    pub candidates: Vec<Candidate>,
    /// Indices into `candidates` naming the active validator set.
    pub validators: Vec<u32>,
    pub bls_public_keys: Vec<[u8; 48]>,
}

/// The structured record decoded from `extra[32..]` (spec §3.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WBFTExtra {
    pub vanity: [u8; 32],
    /// `None` when the inner RLP failed to decode (spec §4.2 "degrade
    /// gracefully"); the pipeline then treats this block as having no
    /// consensus data rather than failing it.
    pub inner: Option<WBFTExtraInner>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WBFTExtraInner {
    pub randao_reveal: Vec<u8>,
    pub prev_round: u32,
    pub prev_prepared_seal: Seal,
    pub prev_committed_seal: Seal,
    pub round: u32,
    pub prepared_seal: Seal,
    pub committed_seal: Seal,
    pub gas_tip: u128,
    pub epoch_info: Option<EpochInfo>,
}

/// Severity bucket for a `ConsensusErrorEvent` (spec §4.1 step 3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsensusSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConsensusSeverity {
    /// `missed_pct` is the fraction of validators that did not sign the
    /// committed seal; `participation_pct` is `|commit_signers| /
    /// |validators| * 100`; `round` is the consensus round the block
    /// committed at. Spec §4.1 step 3 publishes a `ConsensusErrorEvent`
    /// whenever `round > 0` *or* participation misses quorum, so a
    /// round beyond zero always classifies to at least `Low` even when
    /// the committed seal itself reached full participation (extra
    /// rounds were still needed to get there).
    pub fn classify(missed_pct: f64, participation_pct: f64, round: u32) -> Option<Self> {
        if participation_pct < 50.0 {
            Some(Self::Critical)
        } else if missed_pct >= 50.0 {
            Some(Self::High)
        } else if missed_pct >= 33.0 {
            Some(Self::Medium)
        } else if missed_pct > 0.0 || round > 0 {
            Some(Self::Low)
        } else {
            None
        }
    }
}

/// The derived, flattened consensus record for one block (spec §3.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusData {
    pub block_number: u64,
    pub block_hash: B256,
    pub proposer: Address,
    pub round: u32,
    pub prev_round: u32,
    pub validators: Vec<Address>,
    pub prepare_signers: Vec<Address>,
    pub commit_signers: Vec<Address>,
    pub missed_prepare: Vec<Address>,
    pub missed_commit: Vec<Address>,
    pub vanity: [u8; 32],
    pub randao_reveal: Vec<u8>,
    pub gas_tip: u128,
    pub epoch_info: Option<EpochInfo>,
    pub is_epoch_boundary: bool,
    pub timestamp: u64,
}

impl ConsensusData {
    /// Participation% = `|commit_signers| / |validators| * 100` (spec §3.2).
    pub fn participation_pct(&self) -> f64 {
        if self.validators.is_empty() {
            return 0.0;
        }
        (self.commit_signers.len() as f64 / self.validators.len() as f64) * 100.0
    }

    /// Default quorum threshold is two-thirds (spec §3.2, configurable).
    pub fn has_quorum(&self, min_participation_pct: f64) -> bool {
        self.participation_pct() >= min_participation_pct
    }

    /// A block at height `h` is an epoch boundary iff `h > 0 && h %
    /// epoch_length == 0` (spec §3.2).
    pub fn is_epoch_boundary(height: u64, epoch_length: u64) -> bool {
        epoch_length > 0 && height > 0 && height % epoch_length == 0
    }
}

/// Per-validator per-block signing record (spec §3.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorSigningActivity {
    pub block: u64,
    pub validator_address: Address,
    pub validator_index: u32,
    pub signed_prepare: bool,
    pub signed_commit: bool,
    pub round: u32,
}
