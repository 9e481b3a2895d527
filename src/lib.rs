//! lochat Library
//!
//! Core library for the lochat terminal chat client.

pub mod app;
pub mod cli;
pub mod inference;
pub mod session;
pub mod storage;
pub mod types;
pub mod ui;
