//! Giftshop Core - Shared types library.
//!
//! This crate provides common types used across all Giftshop components:
//! - `sync` - Client-side reactive synchronization core
//! - `cli` - Command-line driver for scripted sessions
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no remote store
//! access, no timers. This keeps it lightweight and allows it to be used
//! anywhere, including from UI bindings.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, cart lines, account documents and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
