//! # Veritas Core Library
//!
//! This library provides the core functionality for the Veritas Core service:
//! webhook ingestion and attribution, the append-only activity ledger, report
//! notarization, and agent telemetry ingestion.

pub mod auth;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod notary;
pub mod processor;
pub mod repositories;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod token_refresh;
pub mod vault;
pub mod webhook_verification;
pub use migration;
