//! Deployment module

pub mod coordinator;
pub mod fsm;
pub mod health;
pub mod retry;
