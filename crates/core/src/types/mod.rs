//! Core types for Giftshop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod account;
pub mod cart;
pub mod id;
pub mod price;
pub mod status;

pub use account::{AccountDocument, AccountProfile, OrderRecord};
pub use cart::{CartAggregate, CartLine, CartLineKey};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;
