//! Consensus parser registry (spec §9 "Global state").
//!
//! A process-wide, read-only-after-init singleton keyed by consensus-type
//! name, populated by an explicit `register` call before any fetcher
//! starts — not lazily on first use.

use indexer_core::types::Block;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::{ConsensusError, ParsedConsensus, ValidatorSetCache};

pub type ParserFn = fn(&Block, &ValidatorSetCache) -> Result<ParsedConsensus, ConsensusError>;

static REGISTRY: OnceLock<HashMap<&'static str, ParserFn>> = OnceLock::new();

/// Registers every known consensus-type parser. Must be called exactly
/// once, before the first lookup; subsequent calls are no-ops because
/// `OnceLock` only accepts the first writer.
pub fn register() {
    REGISTRY.get_or_init(|| {
        let mut m: HashMap<&'static str, ParserFn> = HashMap::new();
        m.insert("wbft", crate::parse_consensus_wbft);
        m
    });
}

/// Looks up the parser for `consensus_type`. Returns `None` if `register`
/// was never called or the type is unknown.
pub fn lookup(consensus_type: &str) -> Option<ParserFn> {
    REGISTRY.get().and_then(|m| m.get(consensus_type).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wbft_is_registered_after_register() {
        register();
        assert!(lookup("wbft").is_some());
        assert!(lookup("unknown-consensus").is_none());
    }
}
