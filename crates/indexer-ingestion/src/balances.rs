//! Balance tracking (spec §4.1 step 5).
//!
//! Lazily seeds an address's balance from RPC the first time it is
//! observed, then applies transaction deltas locally. Best-effort:
//! failures here are logged and never fail the surrounding block.

use alloy::primitives::{Address, U256};
use indexer_core::keys;
use indexer_core::rpc::RpcClient;
use indexer_core::storage::{typed, Storage};
use indexer_core::types::AddressBalance;
use std::sync::Arc;
use tracing::warn;

/// Reads the most recent tracked balance for `address` below `height`, or
/// lazily seeds it from RPC at `height - 1` if never observed (spec §4.1:
/// "lazily initialize sender/receiver from RPC at (h-1) if unseen").
async fn current_balance(
    storage: &Arc<dyn Storage>,
    rpc: &Arc<dyn RpcClient>,
    address: Address,
    height: u64,
) -> Option<U256> {
    let mut latest: Option<AddressBalance> = None;
    let prefix = keys::chain::balance_prefix(address);
    let result = storage
        .iterate_prefix(&prefix, &mut |_, value| {
            if let Ok(b) = serde_json::from_slice::<AddressBalance>(value) {
                if b.block_number < height {
                    latest = Some(b);
                }
            }
            true
        })
        .await;
    if let Err(e) = result {
        warn!(%address, error = %e, "balance history scan failed");
    }
    if let Some(b) = latest {
        return Some(b.balance);
    }

    let seed_height = height.saturating_sub(1);
    match rpc.balance_at(address, Some(seed_height)).await {
        Ok(balance) => Some(balance),
        Err(e) => {
            warn!(%address, error = %e, "failed to seed balance from RPC, skipping");
            None
        }
    }
}

async fn persist_balance(storage: &Arc<dyn Storage>, address: Address, height: u64, balance: U256) {
    let record = AddressBalance { address, block_number: height, balance };
    if let Err(e) = typed::put_json(storage, &keys::chain::balance(address, height), &record).await {
        warn!(%address, error = %e, "failed to persist balance update");
    }
}

/// Applies one transaction's value/gas delta to sender and
/// receiver/created-contract balances: `-(value + gas_cost)` to the
/// sender, `+value` to the recipient.
pub async fn apply_transaction_delta(
    storage: &Arc<dyn Storage>,
    rpc: &Arc<dyn RpcClient>,
    height: u64,
    sender: Address,
    recipient: Option<Address>,
    value: U256,
    gas_used: u64,
    effective_gas_price: u128,
) {
    let gas_cost = U256::from(gas_used) * U256::from(effective_gas_price);
    let debit = value.saturating_add(gas_cost);

    if let Some(balance) = current_balance(storage, rpc, sender, height).await {
        let updated = balance.saturating_sub(debit);
        persist_balance(storage, sender, height, updated).await;
    }

    if let Some(to) = recipient {
        if let Some(balance) = current_balance(storage, rpc, to, height).await {
            let updated = balance.saturating_add(value);
            persist_balance(storage, to, height, updated).await;
        }
    }
}
