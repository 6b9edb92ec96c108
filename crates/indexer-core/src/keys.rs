//! Storage key schema (spec §6, "mandatory for cross-version
//! compatibility"). All keys are string-prefixed and lexicographically
//! sortable: fixed-width decimal components are zero-padded so that
//! lexicographic order matches numeric order.

use alloy::primitives::{Address, B256};
use uuid::Uuid;

fn pad20(n: u64) -> String {
    format!("{n:020}")
}

fn pad6(n: u64) -> String {
    format!("{n:06}")
}

pub mod watchlist {
    use super::*;

    pub fn address(id: Uuid) -> String {
        format!("/wl/addr/{id}")
    }

    pub fn chain_index(chain_id: u64, id: Uuid) -> String {
        format!("/wl/chain/{chain_id}/{id}")
    }

    pub fn address_lookup(chain_id: u64, addr: Address) -> String {
        format!("/wl/idx/addr/{chain_id}/{addr:?}")
    }

    pub fn bloom(chain_id: u64) -> String {
        format!("/wl/bloom/{chain_id}")
    }

    pub fn subscriber(sub_id: Uuid) -> String {
        format!("/wl/sub/{sub_id}")
    }

    pub fn addr_subs(addr_id: Uuid, sub_id: Uuid) -> String {
        format!("/wl/addr_subs/{addr_id}/{sub_id}")
    }

    pub fn addr_subs_prefix(addr_id: Uuid) -> String {
        format!("/wl/addr_subs/{addr_id}/")
    }

    pub fn event(chain_id: u64, block: u64, tx_hash: B256, log_idx: u64) -> String {
        format!(
            "/wl/event/{chain_id}/{}/{tx_hash:?}/{}",
            pad20(block),
            pad6(log_idx)
        )
    }

    pub fn event_by_addr(addr_id: Uuid, timestamp_millis: i64, event_id: Uuid) -> String {
        format!(
            "/wl/eventidx/{addr_id}/{}/{event_id}",
            pad20(timestamp_millis.max(0) as u64)
        )
    }

    pub fn event_by_addr_prefix(addr_id: Uuid) -> String {
        format!("/wl/eventidx/{addr_id}/")
    }

    pub fn stats(addr_id: Uuid) -> String {
        format!("/wl/stats/{addr_id}")
    }
}

pub mod chain {
    use super::*;

    pub fn block(height: u64) -> String {
        format!("/block/{}", pad20(height))
    }

    pub fn block_hash_index(hash: B256) -> String {
        format!("/blockhash/{hash:?}")
    }

    pub fn block_prefix() -> &'static str {
        "/block/"
    }

    pub fn receipt(tx_hash: B256) -> String {
        format!("/receipt/{tx_hash:?}")
    }

    pub fn block_tx_hashes(height: u64) -> String {
        format!("/blocktxs/{}", pad20(height))
    }

    pub fn consensus(height: u64) -> String {
        format!("/consensus/{}", pad20(height))
    }

    pub fn epoch_info(epoch_number: u64) -> String {
        format!("/epoch/{}", pad20(epoch_number))
    }

    pub fn validator_activity(height: u64, addr: Address) -> String {
        format!("/validatoract/{}/{addr:?}", pad20(height))
    }

    pub fn balance(addr: Address, height: u64) -> String {
        format!("/balance/{addr:?}/{}", pad20(height))
    }

    pub fn balance_prefix(addr: Address) -> String {
        format!("/balance/{addr:?}/")
    }

    pub fn erc20_transfer(height: u64, tx_hash: B256, log_idx: u64) -> String {
        format!(
            "/transfer/erc20/{}/{tx_hash:?}/{}",
            pad20(height),
            pad6(log_idx)
        )
    }

    pub fn erc721_transfer(height: u64, tx_hash: B256, log_idx: u64) -> String {
        format!(
            "/transfer/erc721/{}/{tx_hash:?}/{}",
            pad20(height),
            pad6(log_idx)
        )
    }

    pub fn contract_creation(addr: Address) -> String {
        format!("/contractcreation/{addr:?}")
    }

    pub fn tx_by_address(addr: Address, tx_hash: B256) -> String {
        format!("/txindex/{addr:?}/{tx_hash:?}")
    }

    pub fn tx_by_address_prefix(addr: Address) -> String {
        format!("/txindex/{addr:?}/")
    }

    pub fn latest_height() -> &'static str {
        "/meta/latest_height"
    }

    pub fn token_metadata(addr: Address) -> String {
        format!("/tokenmeta/{addr:?}")
    }

    pub fn contract_verification(addr: Address) -> String {
        format!("/verified/{addr:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_keys_sort_numerically() {
        let a = chain::block(9);
        let b = chain::block(10);
        let c = chain::block(100);
        let mut v = vec![c.clone(), a.clone(), b.clone()];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }

    #[test]
    fn watchlist_event_key_matches_schema_shape() {
        let k = watchlist::event(1, 99, B256::ZERO, 3);
        assert!(k.starts_with("/wl/event/1/"));
        assert!(k.ends_with("/000003"));
    }
}
