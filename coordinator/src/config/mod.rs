//! Configuration file model

pub mod settings;
