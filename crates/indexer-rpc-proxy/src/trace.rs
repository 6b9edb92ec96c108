//! Internal-transaction tracing (spec §4.5 "Internal-tx tracing").
//!
//! Turns a provider's `callTracer` JSON tree into a flat list of
//! `InternalTransaction`, one per call node, each carrying the path of
//! child indices from the root.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalTransaction {
    pub trace_address: Vec<usize>,
    pub call_type: String,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas_used: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("missing required field `{0}` in call trace node")]
    MissingField(&'static str),
    #[error("invalid hex in field `{0}`")]
    InvalidHex(&'static str),
}

/// Walks a `callTracer` result tree depth-first, producing one
/// `InternalTransaction` per node in the order a reader would expect:
/// a node before its children, children in call order.
pub fn decode_call_trace(root: &Value) -> Result<Vec<InternalTransaction>, TraceError> {
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn walk(
    node: &Value,
    path: &mut Vec<usize>,
    out: &mut Vec<InternalTransaction>,
) -> Result<(), TraceError> {
    let call_type = node
        .get("type")
        .and_then(Value::as_str)
        .ok_or(TraceError::MissingField("type"))?
        .to_string();
    let from = parse_address(node, "from")?;
    let to = match node.get("to").and_then(Value::as_str) {
        Some(s) => Some(s.parse::<Address>().map_err(|_| TraceError::InvalidHex("to"))?),
        None => None,
    };
    let value = node
        .get("value")
        .and_then(Value::as_str)
        .map(parse_hex_u256)
        .transpose()?
        .unwrap_or(U256::ZERO);
    let input = node
        .get("input")
        .and_then(Value::as_str)
        .map(parse_hex_bytes)
        .transpose()?
        .unwrap_or_default();
    let gas_used = node
        .get("gasUsed")
        .and_then(Value::as_str)
        .map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16))
        .transpose()
        .map_err(|_| TraceError::InvalidHex("gasUsed"))?;
    let error = node.get("error").and_then(Value::as_str).map(str::to_string);

    out.push(InternalTransaction {
        trace_address: path.clone(),
        call_type,
        from,
        to,
        value,
        input,
        gas_used,
        error,
    });

    if let Some(calls) = node.get("calls").and_then(Value::as_array) {
        for (i, child) in calls.iter().enumerate() {
            path.push(i);
            walk(child, path, out)?;
            path.pop();
        }
    }
    Ok(())
}

fn parse_address(node: &Value, field: &'static str) -> Result<Address, TraceError> {
    let s = node.get(field).and_then(Value::as_str).ok_or(TraceError::MissingField(field))?;
    s.parse::<Address>().map_err(|_| TraceError::InvalidHex(field))
}

fn parse_hex_u256(s: &str) -> Result<U256, TraceError> {
    U256::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|_| TraceError::InvalidHex("value"))
}

fn parse_hex_bytes(s: &str) -> Result<Bytes, TraceError> {
    s.parse::<Bytes>().map_err(|_| TraceError::InvalidHex("input"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_calls_get_trace_address_paths() {
        let root = json!({
            "type": "CALL",
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0x0",
            "input": "0x",
            "gasUsed": "0x5208",
            "calls": [
                {
                    "type": "CALL",
                    "from": "0x2222222222222222222222222222222222222222",
                    "to": "0x3333333333333333333333333333333333333333",
                    "value": "0x1",
                    "input": "0x",
                    "calls": [
                        {
                            "type": "STATICCALL",
                            "from": "0x3333333333333333333333333333333333333333",
                            "to": "0x4444444444444444444444444444444444444444",
                            "value": "0x0",
                            "input": "0x"
                        }
                    ]
                },
                {
                    "type": "CALL",
                    "from": "0x2222222222222222222222222222222222222222",
                    "to": "0x5555555555555555555555555555555555555555",
                    "value": "0x0",
                    "input": "0x"
                }
            ]
        });

        let calls = decode_call_trace(&root).unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].trace_address, Vec::<usize>::new());
        assert_eq!(calls[1].trace_address, vec![0]);
        assert_eq!(calls[2].trace_address, vec![0, 0]);
        assert_eq!(calls[3].trace_address, vec![1]);
    }

    #[test]
    fn missing_required_field_errors() {
        let root = json!({ "from": "0x1111111111111111111111111111111111111111" });
        assert!(decode_call_trace(&root).is_err());
    }

    #[test]
    fn error_field_is_carried_through() {
        let root = json!({
            "type": "CALL",
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0x0",
            "input": "0x",
            "error": "execution reverted"
        });
        let calls = decode_call_trace(&root).unwrap();
        assert_eq!(calls[0].error.as_deref(), Some("execution reverted"));
    }
}
