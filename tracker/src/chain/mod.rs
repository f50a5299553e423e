//! # Chain Module — Ledger Balance Reads & Aggregation
//!
//! Everything that talks to the Ronin ledger lives here. A scholar's
//! earnings are held across three token contracts, and a tracked batch
//! of wallets wants all three balances for every address without the
//! slowest read holding the rest hostage.
//!
//! ```text
//! mod.rs         — TokenKind, BalanceResult, AggregateWalletView
//! reader.rs      — single (address, token) read over JSON-RPC
//! aggregator.rs  — batch fan-out, staleness cache, streamed views
//! ```
//!
//! ## Design Principles
//!
//! 1. **A failed read is data, not an exception.** Every (address,
//!    token) pair produces exactly one [`BalanceResult`], `Ok` or
//!    `Failed`; nothing about the ledger's mood can shrink a batch.
//!
//! 2. **Each read is an independent point-in-time observation.** No
//!    consistency is promised across the three contracts for one
//!    address, let alone across addresses.
//!
//! 3. **Amounts are display-scaled `f64` at this boundary.** Raw
//!    ledger words are decoded exactly (as `u128`) and scaled once,
//!    in one place, per the token's decimal rule.

pub mod aggregator;
pub mod reader;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config;

pub use aggregator::{Aggregation, AggregationStats, BalanceAggregator};
pub use reader::{BalanceReader, RoninBalanceReader};

// ---------------------------------------------------------------------------
// TokenKind
// ---------------------------------------------------------------------------

/// The three on-chain assets tracked per scholar wallet.
///
/// Each kind is bound to a fixed Ronin contract and a decimal-scaling
/// rule. The set is closed by design; adding a token means adding a
/// variant, a contract constant, and a scaling arm, and the compiler
/// will point at every match that needs updating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Smooth Love Potion. Zero fractional digits: the smallest unit
    /// is a whole potion.
    Slp,
    /// Axie Infinity Shard. 18 decimals.
    Axs,
    /// Wrapped Ether. 18 decimals.
    Eth,
}

impl TokenKind {
    /// All tracked tokens, in the order views report them.
    pub const ALL: [TokenKind; 3] = [TokenKind::Slp, TokenKind::Axs, TokenKind::Eth];

    /// The token's contract address on Ronin.
    pub fn contract_address(&self) -> &'static str {
        match self {
            TokenKind::Slp => config::SLP_CONTRACT,
            TokenKind::Axs => config::AXS_CONTRACT,
            TokenKind::Eth => config::WETH_CONTRACT,
        }
    }

    /// Number of fractional decimal digits in the token's smallest unit.
    pub fn decimals(&self) -> u8 {
        match self {
            TokenKind::Slp => 0,
            TokenKind::Axs | TokenKind::Eth => config::ETHER_DECIMALS,
        }
    }

    /// Scales a raw on-chain word into display units.
    ///
    /// SLP passes through whole; AXS and ETH divide by 10^18. The
    /// division costs precision beyond ~2^53 smallest units, which is
    /// acceptable at a display boundary and mirrors how every wallet
    /// UI renders these tokens.
    pub fn format_units(&self, raw: u128) -> f64 {
        match self.decimals() {
            0 => raw as f64,
            d => raw as f64 / 10f64.powi(d as i32),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Slp => write!(f, "SLP"),
            TokenKind::Axs => write!(f, "AXS"),
            TokenKind::Eth => write!(f, "ETH"),
        }
    }
}

// ---------------------------------------------------------------------------
// BalanceResult
// ---------------------------------------------------------------------------

/// Outcome of a single (address, token) balance read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    /// The read completed and `amount` is the observed balance.
    Ok,
    /// The read failed; `amount` is a zero sentinel, not an observation.
    Failed,
}

/// One completed balance observation.
///
/// A batch of N addresses always produces exactly N×3 of these, each
/// independently `Ok` or `Failed`; never fewer, never merged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    /// The wallet the balance belongs to (as submitted by the caller).
    pub address: String,
    /// The token that was read.
    pub token: TokenKind,
    /// Display-scaled balance. Zero when `status` is `Failed`; check
    /// the status before trusting the number.
    pub amount: f64,
    /// Whether the read succeeded.
    pub status: BalanceStatus,
    /// When the observation was made. Drives the staleness window.
    pub fetched_at: DateTime<Utc>,
}

impl BalanceResult {
    /// A successful observation made now.
    pub fn ok(address: impl Into<String>, token: TokenKind, amount: f64) -> Self {
        Self {
            address: address.into(),
            token,
            amount,
            status: BalanceStatus::Ok,
            fetched_at: Utc::now(),
        }
    }

    /// A failed read, recorded with an explicit zero sentinel so the
    /// rest of the address's view never blocks on it.
    pub fn failed(address: impl Into<String>, token: TokenKind) -> Self {
        Self {
            address: address.into(),
            token,
            amount: 0.0,
            status: BalanceStatus::Failed,
            fetched_at: Utc::now(),
        }
    }

    /// `true` when the observation succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == BalanceStatus::Ok
    }
}

// ---------------------------------------------------------------------------
// AggregateWalletView
// ---------------------------------------------------------------------------

/// The per-address projection handed to callers: all three token
/// results for one wallet, plus whether the address is still pending.
///
/// Views emitted by the aggregator always have `is_loading == false`;
/// the pending form exists so UI callers can render a placeholder row
/// before the address resolves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateWalletView {
    /// The wallet address this view describes.
    pub address: String,
    /// SLP observation.
    pub slp: BalanceResult,
    /// AXS observation.
    pub axs: BalanceResult,
    /// ETH observation.
    pub eth: BalanceResult,
    /// `true` until all three reads for this address have resolved.
    pub is_loading: bool,
}

impl AggregateWalletView {
    /// A placeholder view for an address whose reads are still in
    /// flight. All three slots carry failed-read sentinels so that a
    /// caller rendering the placeholder never sees a phantom balance.
    pub fn pending(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            slp: BalanceResult::failed(address.clone(), TokenKind::Slp),
            axs: BalanceResult::failed(address.clone(), TokenKind::Axs),
            eth: BalanceResult::failed(address.clone(), TokenKind::Eth),
            address,
            is_loading: true,
        }
    }

    /// A resolved view assembled from the three completed reads.
    pub fn resolved(
        address: impl Into<String>,
        slp: BalanceResult,
        axs: BalanceResult,
        eth: BalanceResult,
    ) -> Self {
        Self {
            address: address.into(),
            slp,
            axs,
            eth,
            is_loading: false,
        }
    }

    /// The observation for a given token.
    pub fn result_for(&self, token: TokenKind) -> &BalanceResult {
        match token {
            TokenKind::Slp => &self.slp,
            TokenKind::Axs => &self.axs,
            TokenKind::Eth => &self.eth,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
