//! Block-derived entities shared across every subsystem (spec §3.1).

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A block as delivered by the upstream RPC endpoint, trimmed to the
/// fields the indexer actually consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub proposer: Address,
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub extra_data: Bytes,
    pub transactions: Vec<Transaction>,
}

/// Transaction status as reported by the receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
}

/// One emitted log entry (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: u64,
    pub tx_hash: B256,
    pub tx_index: u64,
    pub block_number: u64,
}

/// Per-transaction receipt (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub status: TxStatus,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// The transaction-type tag (spec §3.1, §9 "Polymorphism across transaction
/// types"). A tagged variant rather than virtual dispatch: the ingestion
/// processor switches on this instead of calling trait objects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TxTypeTag {
    Legacy,
    DynamicFee,
    /// EIP-7702 SetCode.
    SetCode,
    /// Chain-specific fee-delegate transaction type `0x16`.
    FeeDelegate,
}

/// EIP-7702 authorization tuple (spec §3.1). The authority is recovered
/// from the signature; failure to recover marks the authorization as not
/// applied rather than failing the whole transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetCodeAuthorization {
    pub chain_id: u64,
    pub target: Address,
    pub nonce: u64,
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
    /// Populated after a successful `ecrecover` over the authorization
    /// digest. `None` means recovery failed and the authorization was not
    /// applied.
    pub authority: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: B256,
    pub tx_type: TxTypeTag,
    pub tx_index: u64,
    pub block_number: u64,
    /// Zero address when signature recovery fails (spec §4.1 "Tx-from-tx
    /// mapping").
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: u128,
    pub data: Bytes,
    pub chain_id: Option<u64>,
    /// Only set for `FeeDelegate` (`0x16`) transactions; extraction of the
    /// fee-payer is chain-specific and delegated to an external adapter
    /// (spec §9 Open Questions), so this is populated by that adapter, not
    /// by anything in this crate.
    pub fee_payer: Option<Address>,
    /// Only set for `SetCode` transactions.
    pub authorization_list: Vec<SetCodeAuthorization>,
}

impl Transaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// ERC-20 `Transfer` record (spec §3.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Erc20Transfer {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub tx_hash: B256,
    pub block: u64,
    pub log_index: u64,
    pub timestamp: u64,
}

/// ERC-721 `Transfer` record (spec §3.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Erc721Transfer {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub tx_hash: B256,
    pub block: u64,
    pub log_index: u64,
    pub timestamp: u64,
}

/// Contract-creation record (spec §3.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractCreation {
    pub contract_address: Address,
    pub creator: Address,
    pub tx_hash: B256,
    pub block: u64,
    pub timestamp: u64,
}

/// A balance observation at a given height (spec §3.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressBalance {
    pub address: Address,
    pub block_number: u64,
    pub balance: U256,
}

/// keccak256("Transfer(address,address,uint256)"); both ERC-20 and
/// ERC-721 `Transfer` events share this topic0 (spec §3.3).
pub fn transfer_topic0() -> B256 {
    use alloy::primitives::keccak256;
    keccak256(b"Transfer(address,address,uint256)")
}
