//! oracle-guardian: an autonomous on-chain security monitor for a lending
//! protocol's oracle/AMM.
//!
//! Exposes every subsystem module so both the `oracle-guardian` binary and
//! the `tests/` integration suite drive the exact same pipeline.

pub mod actor;
pub mod api;
pub mod attack_sim;
pub mod chain;
pub mod decider;
pub mod events;
pub mod filter;
pub mod middleware;
pub mod models;
pub mod observer;
pub mod pipeline;
pub mod reasoner;
pub mod restore;
