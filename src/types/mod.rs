//! Shared type definitions
//!
//! Turns, runtime configuration and model metadata used across the crate.

pub mod config;
pub mod message;
pub mod model;
