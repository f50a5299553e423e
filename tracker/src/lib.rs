// Copyright (c) 2026 Scholar Tracker contributors. MIT License.
// See LICENSE for details.

//! # Scholar Tracker — Core Library
//!
//! Backend brains for an Axie Infinity scholarship tracker: managers
//! keep a roster of scholars, each scholar is a Ronin wallet, and the
//! tracker answers two questions — what does my roster look like on
//! every device, and what is sitting in those wallets right now.
//!
//! The library is deliberately boring about it. Rosters are opaque
//! JSON owned by the clients; the server stores, replaces, and returns
//! them without ever interpreting a field. Balances come straight from
//! `eth_call` against the Ronin ERC-20 contracts, one read per
//! (address, token) pair, with failures isolated to the pair that
//! produced them.
//!
//! ## Architecture
//!
//! - **auth**   — Token-to-user resolution against the identity service.
//! - **roster** — Roster document model, JSON codec, address forms.
//! - **store**  — Persistent per-user roster records over sled.
//! - **sync**   — Last-write-wins roster synchronization.
//! - **chain**  — Token model, Ronin balance reads, batch aggregation.
//! - **config** — Contract addresses, decimals, limits, defaults.
//!
//! ## Design Philosophy
//!
//! 1. The client owns the roster schema; the server owns durability.
//! 2. A failed balance read is data, not an error. Zero means failed.
//! 3. Anything that crosses the network hides behind a trait.

pub mod auth;
pub mod chain;
pub mod config;
pub mod roster;
pub mod store;
pub mod sync;
