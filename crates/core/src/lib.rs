//! Luxus Core - Shared storefront types.
//!
//! This crate provides the domain types used by the Luxus client crates:
//! - `luxus-client` - Session layer (credentials, gateway, cart, favorites)
//! - `luxus-integration-tests` - End-to-end tests against a mock backend
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no persistence. Everything here is pure and synchronous.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices and shipping, product and user snapshots,
//!   cart line items and favorites

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
