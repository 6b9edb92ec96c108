//! Gap detection (spec §4.3 "Block-gap algorithm", "Receipt-gap algorithm").

use crate::error::GapError;
use alloy::primitives::B256;
use indexer_core::keys;
use indexer_core::storage::{typed, Storage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRange {
    pub start: u64,
    pub end: u64,
}

impl GapRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptGapInfo {
    pub block: u64,
    pub missing_hashes: Vec<B256>,
}

/// Scans `[lo, hi]` linearly, opening a gap on the first missing height
/// and closing it on the next present height (or at `hi` for a terminal
/// gap). Reports progress every 1000 heights; cancellable.
pub async fn detect_block_gaps(
    storage: &Arc<dyn Storage>,
    lo: u64,
    hi: u64,
    cancel: &CancellationToken,
) -> Result<Vec<GapRange>, GapError> {
    let mut gaps = Vec::new();
    let mut in_gap = false;
    let mut gap_start = 0u64;

    for height in lo..=hi {
        if cancel.is_cancelled() {
            return Err(GapError::Cancelled);
        }
        if height > lo && (height - lo) % 1000 == 0 {
            info!(height, hi, "gap detection progress");
        }

        let present = storage.has(&keys::chain::block(height)).await?;
        if !present {
            if !in_gap {
                in_gap = true;
                gap_start = height;
            }
        } else if in_gap {
            gaps.push(GapRange { start: gap_start, end: height - 1 });
            in_gap = false;
        }
    }

    if in_gap {
        gaps.push(GapRange { start: gap_start, end: hi });
    }

    Ok(gaps)
}

/// For every present block in `[lo, hi]`, checks which of its transaction
/// receipts are missing from storage and collects the non-empty sets.
pub async fn detect_receipt_gaps(
    storage: &Arc<dyn Storage>,
    lo: u64,
    hi: u64,
    cancel: &CancellationToken,
) -> Result<Vec<ReceiptGapInfo>, GapError> {
    let mut infos = Vec::new();

    for height in lo..=hi {
        if cancel.is_cancelled() {
            return Err(GapError::Cancelled);
        }

        if !storage.has(&keys::chain::block(height)).await? {
            continue;
        }

        let tx_hashes: Option<Vec<B256>> =
            typed::get_json(storage, &keys::chain::block_tx_hashes(height)).await?;
        let Some(tx_hashes) = tx_hashes else { continue };

        let mut missing = Vec::new();
        for hash in tx_hashes {
            if !storage.has(&keys::chain::receipt(hash)).await? {
                missing.push(hash);
            }
        }

        if !missing.is_empty() {
            infos.push(ReceiptGapInfo { block: height, missing_hashes: missing });
        }
    }

    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_core::test_support::InMemoryStorage;
    use indexer_core::storage::typed;

    async fn mark_present(storage: &Arc<dyn Storage>, height: u64) {
        storage.put(&keys::chain::block(height), vec![1]).await.unwrap();
    }

    #[tokio::test]
    async fn detects_middle_and_terminal_gaps() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        for h in [1, 2, 3, 7, 8] {
            mark_present(&storage, h).await;
        }

        let cancel = CancellationToken::new();
        let gaps = detect_block_gaps(&storage, 1, 8, &cancel).await.unwrap();
        assert_eq!(gaps, vec![GapRange { start: 4, end: 6 }]);
    }

    #[tokio::test]
    async fn terminal_gap_extends_to_hi() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        mark_present(&storage, 1).await;

        let cancel = CancellationToken::new();
        let gaps = detect_block_gaps(&storage, 1, 5, &cancel).await.unwrap();
        assert_eq!(gaps, vec![GapRange { start: 2, end: 5 }]);
    }

    #[tokio::test]
    async fn receipt_gap_reports_only_missing_hashes() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        mark_present(&storage, 10).await;
        let h1 = B256::repeat_byte(1);
        let h2 = B256::repeat_byte(2);
        typed::put_json(&storage, &keys::chain::block_tx_hashes(10), &vec![h1, h2])
            .await
            .unwrap();
        storage.put(&keys::chain::receipt(h1), vec![1]).await.unwrap();

        let cancel = CancellationToken::new();
        let gaps = detect_receipt_gaps(&storage, 10, 10, &cancel).await.unwrap();
        assert_eq!(gaps, vec![ReceiptGapInfo { block: 10, missing_hashes: vec![h2] }]);
    }
}
