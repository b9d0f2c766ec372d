//! Election lifecycle and vote relay service.
//!
//! Coordinates an on-chain voting contract, which holds elections, tallies
//! and per-voter vote flags, with a local SQLite store holding lock state,
//! vote receipts, result snapshots and candidate profiles.

pub mod api;
pub mod auth_middleware;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod monitor;
pub mod reconciler;
pub mod relay;
pub mod results;
pub mod signing;
pub mod state;
pub mod types;
pub mod utils;
