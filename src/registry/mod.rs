//! Address Registry Module
//!
//! Deterministic deposit address assignment per user per chain, plus the
//! signing material the sweep needs to move funds off those addresses.

pub mod service;

pub use service::{AddressRegistry, KeyMaterial};
