//! Internal implementation modules for `psm-core`.
//!
//! Most callers should go through `psm_core::api` rather than importing these
//! modules directly.

pub mod commands;
pub mod config;
pub mod runtime;
pub mod store;
pub mod tooling;
