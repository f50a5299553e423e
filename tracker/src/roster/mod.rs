//! # Roster Data Model
//!
//! A roster is one user's collection of scholar records. The sync
//! pipeline treats it as an opaque JSON value end to end (see
//! [`codec`]) so that clients can evolve their scholar shape without a
//! server deploy. The typed [`Scholar`] record is a projection for
//! callers that do need structure, such as feeding wallet addresses
//! into the balance aggregator.
//!
//! ```text
//! mod.rs    — Scholar, RosterDocument, address normalization
//! codec.rs  — the symmetric encode/decode pair used at the store boundary
//! ```

pub mod codec;

use serde::{Deserialize, Serialize};

use crate::auth::UserId;

pub use codec::{decode, encode, CodecError};

// ---------------------------------------------------------------------------
// Scholar
// ---------------------------------------------------------------------------

/// A single scholar record as understood by this backend.
///
/// Clients sync richer objects than this; only the fields the backend
/// itself ever reads are modeled. Absent fields are explicit `Option`s,
/// never implicit "check if the key exists" lookups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scholar {
    /// Display name chosen by the manager.
    #[serde(default)]
    pub name: String,

    /// The scholar's Ronin wallet address, in `0x…` or `ronin:…` form.
    pub address: String,

    /// Where this scholar's share gets paid out. Many scholars have no
    /// separate payment wallet, so this is genuinely optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_address: Option<String>,

    /// How earnings split between scholar and manager. Unset until the
    /// manager configures the scholar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<ShareSplit>,
}

/// Percentage split of a scholar's earnings.
///
/// The two sides are stored as the clients enter them and are not
/// forced to sum to 100; enforcing that is the client's business.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSplit {
    /// Scholar's percentage share.
    pub scholar: u8,
    /// Manager's percentage share.
    pub manager: u8,
}

impl ShareSplit {
    /// Splits a whole-unit amount between the two sides, each floored
    /// the way payout screens round.
    pub fn split(&self, total: u64) -> (u64, u64) {
        (
            total * u64::from(self.scholar) / 100,
            total * u64::from(self.manager) / 100,
        )
    }
}

impl Scholar {
    /// Extracts the typed scholars from a raw roster payload.
    ///
    /// Entries that do not parse as a [`Scholar`] are skipped rather than
    /// failing the whole roster; sync never validates payload shape, so
    /// a partially-typed roster is a legitimate state.
    pub fn from_payload(payload: &serde_json::Value) -> Vec<Scholar> {
        payload
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// RosterDocument
// ---------------------------------------------------------------------------

/// The persisted roster for one user.
///
/// Exactly one document exists per [`UserId`]; every write replaces the
/// payload wholesale. There is no version field because the conflict
/// policy is last-write-wins with no concurrency check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RosterDocument {
    /// The owning user. Sole key into the record store.
    pub user_id: UserId,

    /// The roster payload, opaque at this layer.
    pub scholars: serde_json::Value,
}

impl RosterDocument {
    /// An empty roster for a user with nothing synced yet. This is a
    /// valid, successful state; "no data" is not an error.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            scholars: serde_json::Value::Array(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Address Normalization
// ---------------------------------------------------------------------------

/// Rewrites a wallet address into Ronin's native `ronin:` form.
///
/// Addresses already in that form pass through unchanged, as do strings
/// that carry neither prefix — this core never validates addresses.
pub fn as_ronin(address: &str) -> String {
    match address.strip_prefix("0x") {
        Some(rest) => format!("ronin:{rest}"),
        None => address.to_string(),
    }
}

/// Rewrites a wallet address into the `0x` form expected by the ledger
/// RPC interface.
pub fn as_hex(address: &str) -> String {
    match address.strip_prefix("ronin:") {
        Some(rest) => format!("0x{rest}"),
        None => address.to_string(),
    }
}

/// Wallet addresses of every typed scholar in a roster payload, in the
/// ledger's hex form. This is the path from a synced roster into the
/// balance aggregator; untyped entries contribute nothing.
pub fn wallet_addresses(payload: &serde_json::Value) -> Vec<String> {
    Scholar::from_payload(payload)
        .iter()
        .map(|scholar| as_hex(&scholar.address))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
