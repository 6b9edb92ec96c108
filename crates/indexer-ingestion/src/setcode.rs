//! EIP-7702 SetCode authorization processing (spec §3.1, §4.1 step 4d).

use indexer_core::keys;
use indexer_core::storage::{Batch, StorageError};
use indexer_core::types::{SetCodeAuthorization, Transaction};
use tracing::warn;

/// One applied authorization, persisted under the authority's address.
/// Authorizations whose signature recovery failed (`authority == None`)
/// are not applied, per spec §3.1.
pub fn apply_setcode_authorizations(batch: &mut dyn Batch, tx: &Transaction) -> Result<u32, StorageError> {
    let mut applied = 0u32;
    for auth in &tx.authorization_list {
        match auth.authority {
            Some(authority) => {
                batch.put(
                    &keys::chain::tx_by_address(authority, tx.hash),
                    serde_json::to_vec(&delegation_record(tx, auth)).unwrap(),
                );
                applied += 1;
            }
            None => {
                warn!(tx = %tx.hash, target = %auth.target, "SetCode authorization recovery failed, not applied");
            }
        }
    }
    Ok(applied)
}

#[derive(serde::Serialize)]
struct DelegationRecord {
    tx_hash: alloy::primitives::B256,
    target: alloy::primitives::Address,
    nonce: u64,
}

fn delegation_record(tx: &Transaction, auth: &SetCodeAuthorization) -> DelegationRecord {
    DelegationRecord { tx_hash: tx.hash, target: auth.target, nonce: auth.nonce }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes, B256, U256};
    use indexer_core::test_support::InMemoryStorage;
    use indexer_core::storage::Storage;
    use indexer_core::types::TxTypeTag;
    use std::sync::Arc;

    fn tx_with_auth(authority: Option<alloy::primitives::Address>) -> Transaction {
        Transaction {
            hash: B256::repeat_byte(7),
            tx_type: TxTypeTag::SetCode,
            tx_index: 0,
            block_number: 1,
            from: address!("1111111111111111111111111111111111111111"),
            to: None,
            value: U256::ZERO,
            gas: 21000,
            gas_price: 0,
            data: Bytes::new(),
            chain_id: Some(1),
            fee_payer: None,
            authorization_list: vec![SetCodeAuthorization {
                chain_id: 1,
                target: address!("2222222222222222222222222222222222222222"),
                nonce: 0,
                y_parity: 0,
                r: U256::ZERO,
                s: U256::ZERO,
                authority,
            }],
        }
    }

    #[tokio::test]
    async fn applied_authorization_is_persisted_under_authority() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let authority = address!("3333333333333333333333333333333333333333");
        let tx = tx_with_auth(Some(authority));
        let mut batch = storage.new_batch();
        let applied = apply_setcode_authorizations(batch.as_mut(), &tx).unwrap();
        batch.commit().await.unwrap();

        assert_eq!(applied, 1);
        assert!(storage.has(&keys::chain::tx_by_address(authority, tx.hash)).await.unwrap());
    }

    #[tokio::test]
    async fn failed_recovery_applies_nothing() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let tx = tx_with_auth(None);
        let mut batch = storage.new_batch();
        let applied = apply_setcode_authorizations(batch.as_mut(), &tx).unwrap();
        batch.commit().await.unwrap();

        assert_eq!(applied, 0);
    }
}
