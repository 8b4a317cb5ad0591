//! Deploy Coordinator Library
//!
//! Triggers, retries and verifies an init action across SSH, HTTP API and
//! webhook targets, and aggregates the per-environment outcomes.

pub mod adapters;
pub mod app;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod notify;
pub mod registry;
pub mod utils;
