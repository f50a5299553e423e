//! # Tracker Configuration & Constants
//!
//! Every magic number in the tracker lives here: the Ronin contract
//! addresses, decimal scaling rules, the balance staleness window, and
//! the default service ports. If you find a hardcoded constant anywhere
//! else in the tree, move it here.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Ronin Ledger
// ---------------------------------------------------------------------------

/// Chain ID of the Ronin network. Axie Infinity's sidechain.
pub const RONIN_CHAIN_ID: u64 = 2020;

/// Smooth Love Potion (SLP) token contract on Ronin.
///
/// SLP has no fractional units: the smallest on-chain unit is a whole
/// potion, so raw balances are used as-is.
pub const SLP_CONTRACT: &str = "0xa8754b9fa15fc18bb59458815510e40a12cd2014";

/// Axie Infinity Shard (AXS) token contract on Ronin. 18 decimals.
pub const AXS_CONTRACT: &str = "0x97a9107c1793bc407d6f527b77e7fff4d812bece";

/// Wrapped Ether (WETH) token contract on Ronin. 18 decimals.
pub const WETH_CONTRACT: &str = "0xc99a6a985ed2cac1ef41640596c5a5f9f4e19ef5";

/// ERC-20 `balanceOf(address)` function selector: the first four bytes
/// of `keccak256("balanceOf(address)")`. Part of the wire format, do
/// not touch.
pub const ERC20_BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Number of decimals used by 18-decimal tokens (AXS, WETH).
pub const ETHER_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Balance Aggregation
// ---------------------------------------------------------------------------

/// How long a fetched balance stays fresh before the aggregator will
/// re-query the ledger for it. Five minutes matches how often scholar
/// balances meaningfully change; anything shorter just hammers the RPC
/// endpoint for identical answers.
pub const BALANCE_STALENESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Maximum number of ledger reads in flight at once across a batch.
///
/// A batch of N addresses wants 3N reads. Without a cap, a manager
/// tracking a few hundred scholars turns one aggregation into a small
/// denial-of-service against the RPC endpoint.
pub const DEFAULT_FANOUT_CAP: usize = 12;

/// Per-request timeout for ledger RPC calls. A read slower than this
/// is reported as failed rather than stalling its address's view.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Service Defaults
// ---------------------------------------------------------------------------

/// Default port for the sync HTTP API.
pub const DEFAULT_API_PORT: u16 = 8370;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 8371;

/// Default Ronin JSON-RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://api.roninchain.com/rpc";

/// Per-request timeout when calling the identity provider.
pub const IDENTITY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
