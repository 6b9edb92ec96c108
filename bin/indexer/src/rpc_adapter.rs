//! `indexer_core::rpc::RpcClient` implementation that speaks plain HTTP
//! JSON-RPC to an `eth_*`-compatible endpoint via `reqwest` (spec §1, §6
//! — the RPC transport is an external collaborator the core only
//! specifies the interface for).
//!
//! Deliberately not built on `alloy::providers::Provider`: this binary
//! only needs a handful of read-only calls and hand-rolled request/
//! response structs keep the wire format fully under our control.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use indexer_core::rpc::{CallMessage, RpcClient, RpcError};
use indexer_core::types::{Block, Log, Receipt, SetCodeAuthorization, Transaction, TxStatus, TxTypeTag};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct HttpRpcClient {
    http: reqwest::Client,
    url: reqwest::Url,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: reqwest::Url) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self { http, url, next_id: AtomicU64::new(1) }
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let resp = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { RpcError::Timeout } else { RpcError::Transport(e.to_string()) })?;

        if resp.status().as_u16() == 429 {
            return Err(RpcError::RateLimited);
        }
        let envelope: Value = resp.json().await.map_err(|e| RpcError::Decode(e.to_string()))?;
        if let Some(err) = envelope.get("error") {
            return Err(RpcError::Transport(err.to_string()));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn get_block_by_number(&self, height: u64) -> Result<Option<Block>, RpcError> {
        let result = self
            .call_raw("eth_getBlockByNumber", json!([format!("0x{height:x}"), true]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        decode_block(&result).map(Some)
    }

    async fn get_block_receipts(&self, height: u64) -> Result<Vec<Receipt>, RpcError> {
        let result = self.call_raw("eth_getBlockReceipts", json!([format!("0x{height:x}")])).await?;
        let items = result.as_array().ok_or_else(|| RpcError::Decode("receipts: expected array".into()))?;
        items.iter().map(decode_receipt).collect()
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Value>, RpcError> {
        let result = self.call_raw("eth_getTransactionByHash", json!([hash.to_string()])).await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        let result = self.call_raw("eth_getTransactionReceipt", json!([hash.to_string()])).await?;
        if result.is_null() {
            return Ok(None);
        }
        decode_receipt(&result).map(Some)
    }

    async fn balance_at(&self, address: Address, block: Option<u64>) -> Result<U256, RpcError> {
        let tag = block_tag(block);
        let result = self.call_raw("eth_getBalance", json!([address.to_string(), tag])).await?;
        parse_u256(&result)
    }

    async fn code_at(&self, address: Address, block: Option<u64>) -> Result<Bytes, RpcError> {
        let tag = block_tag(block);
        let result = self.call_raw("eth_getCode", json!([address.to_string(), tag])).await?;
        parse_bytes(&result)
    }

    async fn call_contract(&self, msg: CallMessage, block: Option<u64>) -> Result<Bytes, RpcError> {
        let tag = block_tag(block);
        let mut call = json!({
            "to": msg.to.to_string(),
            "data": msg.data.to_string(),
            "value": format!("0x{:x}", msg.value),
        });
        if let Some(from) = msg.from {
            call["from"] = json!(from.to_string());
        }
        if let Some(gas) = msg.gas {
            call["gas"] = json!(format!("0x{gas:x}"));
        }
        let result = self.call_raw("eth_call", json!([call, tag])).await?;
        parse_bytes(&result)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.call_raw("eth_blockNumber", json!([])).await?;
        parse_u64(&result)
    }

    async fn subscribe_pending_transactions(
        &self,
    ) -> Result<tokio::sync::mpsc::Receiver<B256>, RpcError> {
        // Plain HTTP JSON-RPC has no subscription transport; the upstream
        // must be reached over a websocket adapter for this, which this
        // binary doesn't wire up. Return an already-closed channel so
        // callers that poll it simply see no pending transactions.
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call_raw(method, params).await
    }
}

fn block_tag(block: Option<u64>) -> String {
    match block {
        Some(h) => format!("0x{h:x}"),
        None => "latest".to_string(),
    }
}

fn parse_u64(value: &Value) -> Result<u64, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::Decode("expected hex string".into()))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| RpcError::Decode(e.to_string()))
}

fn parse_u256(value: &Value) -> Result<U256, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::Decode("expected hex string".into()))?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| RpcError::Decode(e.to_string()))
}

fn parse_u128(value: &Value) -> Result<u128, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::Decode("expected hex string".into()))?;
    u128::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| RpcError::Decode(e.to_string()))
}

fn parse_bytes(value: &Value) -> Result<Bytes, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::Decode("expected hex string".into()))?;
    s.parse::<Bytes>().map_err(|e| RpcError::Decode(e.to_string()))
}

fn parse_address(value: &Value) -> Result<Address, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::Decode("expected address string".into()))?;
    s.parse::<Address>().map_err(|e| RpcError::Decode(e.to_string()))
}

fn parse_opt_address(value: Option<&Value>) -> Result<Option<Address>, RpcError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_address(v).map(Some),
    }
}

fn parse_b256(value: &Value) -> Result<B256, RpcError> {
    let s = value.as_str().ok_or_else(|| RpcError::Decode("expected hash string".into()))?;
    s.parse::<B256>().map_err(|e| RpcError::Decode(e.to_string()))
}

fn field<'a>(v: &'a Value, name: &str) -> Result<&'a Value, RpcError> {
    v.get(name).ok_or_else(|| RpcError::Decode(format!("missing field `{name}`")))
}

fn decode_tx_type(value: &Value) -> TxTypeTag {
    match value.get("type").and_then(Value::as_str) {
        Some("0x2") => TxTypeTag::DynamicFee,
        Some("0x4") => TxTypeTag::SetCode,
        Some("0x16") => TxTypeTag::FeeDelegate,
        _ => TxTypeTag::Legacy,
    }
}

fn decode_authorization_list(value: &Value) -> Vec<SetCodeAuthorization> {
    let Some(list) = value.get("authorizationList").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|entry| {
            Some(SetCodeAuthorization {
                chain_id: parse_u64(entry.get("chainId")?).ok()?,
                target: parse_address(entry.get("address")?).ok()?,
                nonce: parse_u64(entry.get("nonce")?).ok()?,
                y_parity: parse_u64(entry.get("yParity").or_else(|| entry.get("v"))?).ok()? as u8,
                r: parse_u256(entry.get("r")?).ok()?,
                s: parse_u256(entry.get("s")?).ok()?,
                authority: None,
            })
        })
        .collect()
}

fn decode_transaction(value: &Value, block_number: u64) -> Result<Transaction, RpcError> {
    let tx_type = decode_tx_type(value);
    let mut authorization_list = decode_authorization_list(value);
    // Authority recovery over the EIP-7702 signing hash is chain/wire-specific
    // wire detail left to a fuller adapter (spec §9 Open Questions); this
    // adapter records the unsigned tuples without populating `authority`.
    if !matches!(tx_type, TxTypeTag::SetCode) {
        authorization_list.clear();
    }

    Ok(Transaction {
        hash: parse_b256(field(value, "hash")?)?,
        tx_type,
        tx_index: value.get("transactionIndex").map(parse_u64).transpose()?.unwrap_or(0),
        block_number,
        from: parse_address(field(value, "from")?)?,
        to: parse_opt_address(value.get("to"))?,
        value: value.get("value").map(parse_u256).transpose()?.unwrap_or(U256::ZERO),
        gas: value.get("gas").map(parse_u64).transpose()?.unwrap_or(0),
        gas_price: value.get("gasPrice").map(parse_u128).transpose()?.unwrap_or(0),
        data: value.get("input").map(parse_bytes).transpose()?.unwrap_or_default(),
        chain_id: value.get("chainId").and_then(|v| parse_u64(v).ok()),
        fee_payer: None,
        authorization_list,
    })
}

fn decode_block(value: &Value) -> Result<Block, RpcError> {
    let number = parse_u64(field(value, "number")?)?;
    let transactions = field(value, "transactions")?
        .as_array()
        .ok_or_else(|| RpcError::Decode("transactions: expected array".into()))?
        .iter()
        .map(|tx| decode_transaction(tx, number))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Block {
        number,
        hash: parse_b256(field(value, "hash")?)?,
        parent_hash: parse_b256(field(value, "parentHash")?)?,
        proposer: parse_address(field(value, "miner")?)?,
        timestamp: parse_u64(field(value, "timestamp")?)?,
        gas_used: parse_u64(field(value, "gasUsed")?)?,
        gas_limit: parse_u64(field(value, "gasLimit")?)?,
        extra_data: value.get("extraData").map(parse_bytes).transpose()?.unwrap_or_default(),
        transactions,
    })
}

fn decode_log(value: &Value) -> Result<Log, RpcError> {
    let topics = field(value, "topics")?
        .as_array()
        .ok_or_else(|| RpcError::Decode("topics: expected array".into()))?
        .iter()
        .map(parse_b256)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Log {
        address: parse_address(field(value, "address")?)?,
        topics,
        data: value.get("data").map(parse_bytes).transpose()?.unwrap_or_default(),
        log_index: value.get("logIndex").map(parse_u64).transpose()?.unwrap_or(0),
        tx_hash: parse_b256(field(value, "transactionHash")?)?,
        tx_index: value.get("transactionIndex").map(parse_u64).transpose()?.unwrap_or(0),
        block_number: value.get("blockNumber").map(parse_u64).transpose()?.unwrap_or(0),
    })
}

fn decode_receipt(value: &Value) -> Result<Receipt, RpcError> {
    let status = match value.get("status").and_then(Value::as_str) {
        Some("0x1") => TxStatus::Success,
        _ => TxStatus::Failed,
    };
    let logs = field(value, "logs")?
        .as_array()
        .ok_or_else(|| RpcError::Decode("logs: expected array".into()))?
        .iter()
        .map(decode_log)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Receipt {
        tx_hash: parse_b256(field(value, "transactionHash")?)?,
        status,
        gas_used: parse_u64(field(value, "gasUsed")?)?,
        effective_gas_price: value.get("effectiveGasPrice").map(parse_u128).transpose()?.unwrap_or(0),
        contract_address: parse_opt_address(value.get("contractAddress"))?,
        logs,
    })
}
