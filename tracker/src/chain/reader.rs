//! # Chain Balance Reader
//!
//! A single (address, token) balance read against the Ronin JSON-RPC
//! endpoint: one `eth_call` invoking ERC-20 `balanceOf(address)` on the
//! token's contract, decoded and scaled per the token's decimal rule.
//!
//! There is no retry here and no error propagation past the caller. A
//! transport failure, an RPC-level error, or an undecodable word all
//! collapse into `status: Failed` on the returned [`BalanceResult`],
//! so one misbehaving pair can never abort a batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BalanceResult, TokenKind};
use crate::config;
use crate::roster;

// ---------------------------------------------------------------------------
// Errors (internal; callers only ever see a Failed result)
// ---------------------------------------------------------------------------

/// Failure modes of a single read, folded into the result's status.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The endpoint could not be reached or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The address or the returned word could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The returned word exceeds 128 bits. No real balance gets here;
    /// treat it as a broken contract rather than saturating silently.
    #[error("balance word exceeds 128 bits")]
    Overflow,
}

// ---------------------------------------------------------------------------
// BalanceReader
// ---------------------------------------------------------------------------

/// Single-address, single-token balance read.
///
/// The aggregator depends only on this trait, so tests drive it with
/// in-memory fakes and production wires in [`RoninBalanceReader`].
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Reads one balance. Infallible by signature: failure is captured
    /// in the result's status, never raised.
    async fn read(&self, address: &str, token: TokenKind) -> BalanceResult;
}

// ---------------------------------------------------------------------------
// JSON-RPC envelope
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope for `eth_call`.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: (CallParams<'a>, &'static str),
    id: u32,
}

/// The call object: target contract and ABI-encoded calldata.
#[derive(Debug, Serialize)]
struct CallParams<'a> {
    to: &'a str,
    data: &'a str,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// ---------------------------------------------------------------------------
// RoninBalanceReader
// ---------------------------------------------------------------------------

/// [`BalanceReader`] backed by a Ronin JSON-RPC endpoint over HTTP.
pub struct RoninBalanceReader {
    client: reqwest::Client,
    endpoint: String,
}

impl RoninBalanceReader {
    /// Builds a reader against the given JSON-RPC URL with the
    /// configured per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config::RPC_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn read_raw(&self, address: &str, token: TokenKind) -> Result<u128, ReadError> {
        let data = encode_balance_of(address)?;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: (
                CallParams {
                    to: token.contract_address(),
                    data: &data,
                },
                "latest",
            ),
            id: 1,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReadError::Transport(format!(
                "rpc endpoint returned {}",
                status
            )));
        }

        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ReadError::Decode(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(ReadError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let word = envelope
            .result
            .ok_or_else(|| ReadError::Decode("response carried neither result nor error".into()))?;
        decode_word(&word)
    }
}

#[async_trait]
impl BalanceReader for RoninBalanceReader {
    async fn read(&self, address: &str, token: TokenKind) -> BalanceResult {
        match self.read_raw(address, token).await {
            Ok(raw) => BalanceResult::ok(address, token, token.format_units(raw)),
            Err(e) => {
                tracing::warn!(%address, %token, error = %e, "balance read failed");
                BalanceResult::failed(address, token)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ABI helpers
// ---------------------------------------------------------------------------

/// ABI-encodes a `balanceOf(address)` call: the 4-byte selector followed
/// by the address left-padded to a 32-byte word.
///
/// Accepts `0x…` and `ronin:…` address forms; anything that does not
/// decode to exactly 20 bytes is rejected.
fn encode_balance_of(address: &str) -> Result<String, ReadError> {
    let hex_form = roster::as_hex(address);
    let stripped = hex_form
        .strip_prefix("0x")
        .ok_or_else(|| ReadError::Decode(format!("unrecognized address form: {address}")))?;

    let raw = hex::decode(stripped)
        .map_err(|e| ReadError::Decode(format!("address is not hex: {e}")))?;
    if raw.len() != 20 {
        return Err(ReadError::Decode(format!(
            "address must be 20 bytes, got {}",
            raw.len()
        )));
    }

    let mut calldata = Vec::with_capacity(4 + 32);
    calldata.extend_from_slice(&config::ERC20_BALANCE_OF_SELECTOR);
    calldata.extend_from_slice(&[0u8; 12]);
    calldata.extend_from_slice(&raw);

    Ok(format!("0x{}", hex::encode(calldata)))
}

/// Decodes the 32-byte word returned by `eth_call` into a `u128`.
///
/// Any word whose high 16 bytes are non-zero is rejected as overflow;
/// 2^128 smallest units is far beyond any supply these contracts have.
fn decode_word(word: &str) -> Result<u128, ReadError> {
    let stripped = word.strip_prefix("0x").unwrap_or(word);
    if stripped.is_empty() {
        return Err(ReadError::Decode("empty call result".into()));
    }

    let raw = hex::decode(stripped)
        .map_err(|e| ReadError::Decode(format!("call result is not hex: {e}")))?;
    if raw.len() > 32 {
        return Err(ReadError::Decode(format!(
            "call result is {} bytes, expected at most 32",
            raw.len()
        )));
    }

    let (high, low) = if raw.len() > 16 {
        raw.split_at(raw.len() - 16)
    } else {
        (&[][..], &raw[..])
    };
    if high.iter().any(|&b| b != 0) {
        return Err(ReadError::Overflow);
    }

    let mut buf = [0u8; 16];
    buf[16 - low.len()..].copy_from_slice(low);
    Ok(u128::from_be_bytes(buf))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
