//! Data models

pub mod environment;
pub mod job;
