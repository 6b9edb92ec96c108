//! BLS aggregate-signature verification for WBFT seals (spec §4.2).

use blst::min_pk::{AggregatePublicKey, PublicKey};
use blst::BLST_ERROR;
use indexer_core::consensus_types::Seal;
use thiserror::Error;

/// Domain-separation tag for WBFT seal signatures, matching the scheme's
/// min_pk augmented-proof-of-possession ciphersuite.
pub const SEAL_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlsError {
    #[error("seal signature is {0} bytes, expected 96")]
    BadSignatureLength(usize),
    #[error("validator set is empty")]
    EmptyValidatorSet,
    #[error("no signers extracted from seal bitmap")]
    NoSigners,
    #[error("only {signer_count}/{validator_count} validators signed ({participation_pct:.2}% < required)")]
    InsufficientSigners { signer_count: usize, validator_count: usize, participation_pct: f64 },
    #[error("bls public key at index {0} is malformed")]
    MalformedPublicKey(usize),
    #[error("bls signature bytes are malformed")]
    MalformedSignature,
    #[error("signature does not verify against the aggregated public key")]
    VerificationFailed,
}

/// Outcome of a successful `verify_seal` call (spec §4.2 steps 1-5): quorum
/// is guaranteed to have been met by the time this is returned, since a
/// below-threshold seal is rejected as `BlsError::InsufficientSigners`.
#[derive(Debug, Clone, PartialEq)]
pub struct SealVerification {
    pub verified: bool,
    pub skipped: bool,
    pub signer_count: usize,
    pub validator_count: usize,
    pub participation_pct: f64,
    pub has_quorum: bool,
}

/// Verifies one seal's aggregated BLS signature against the subset of
/// `bls_public_keys` named by the seal's sealers bitmap (spec §4.2):
///
/// 1. Signature must be exactly 96 bytes (checked before any crypto work).
/// 2. The validator set must be non-empty.
/// 3. Extract signer indices from the bitmap; require at least one signer,
///    then reject below `min_participation_pct` with `InsufficientSigners`
///    (spec §4.2 step 3, §7) before any aggregation/verification work.
/// 4. If `skip_verification` is set, return a quorum decision only
///    (decode-only mode).
/// 5. Otherwise aggregate the signers' BLS public keys and verify the
///    aggregated signature against `message` under `SEAL_DST`.
pub fn verify_seal(
    seal: &Seal,
    validator_bls_keys: &[[u8; 48]],
    message: &[u8],
    min_participation_pct: f64,
    skip_verification: bool,
) -> Result<SealVerification, BlsError> {
    if seal.signature.len() != 96 {
        return Err(BlsError::BadSignatureLength(seal.signature.len()));
    }
    if validator_bls_keys.is_empty() {
        return Err(BlsError::EmptyValidatorSet);
    }

    let signer_indices: Vec<usize> = (0..validator_bls_keys.len()).filter(|&i| seal.signed(i)).collect();
    if signer_indices.is_empty() {
        return Err(BlsError::NoSigners);
    }

    let validator_count = validator_bls_keys.len();
    let signer_count = signer_indices.len();
    let participation_pct = (signer_count as f64 / validator_count as f64) * 100.0;

    if participation_pct < min_participation_pct {
        return Err(BlsError::InsufficientSigners { signer_count, validator_count, participation_pct });
    }

    if skip_verification {
        return Ok(SealVerification {
            verified: false,
            skipped: true,
            signer_count,
            validator_count,
            participation_pct,
            has_quorum: true,
        });
    }

    let keys: Vec<PublicKey> = signer_indices
        .iter()
        .map(|&i| {
            PublicKey::from_bytes(&validator_bls_keys[i]).map_err(|_| BlsError::MalformedPublicKey(i))
        })
        .collect::<Result<_, _>>()?;

    let agg_pk = aggregate_public_keys(&keys)?;

    let signature = blst::min_pk::Signature::from_bytes(&seal.signature)
        .map_err(|_| BlsError::MalformedSignature)?;

    let result = signature.verify(true, message, SEAL_DST, &[], &agg_pk.to_public_key(), true);
    if result != BLST_ERROR::BLST_SUCCESS {
        return Err(BlsError::VerificationFailed);
    }

    Ok(SealVerification {
        verified: true,
        skipped: false,
        signer_count,
        validator_count,
        participation_pct,
        has_quorum: true,
    })
}

/// Aggregates public keys, associative and order-independent. Errors on
/// an empty input; a malformed member would already have been rejected
/// by `PublicKey::from_bytes` before reaching here.
fn aggregate_public_keys(keys: &[PublicKey]) -> Result<AggregatePublicKey, BlsError> {
    let refs: Vec<&PublicKey> = keys.iter().collect();
    AggregatePublicKey::aggregate(&refs, true).map_err(|_| BlsError::VerificationFailed)
}
