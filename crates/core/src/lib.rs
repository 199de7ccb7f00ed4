//! Storefront Core - Shared types library.
//!
//! This crate provides the types shared by every storefront component:
//! - `client` - Session, cart, checkout and catalog client for the REST backend
//! - `cli` - Command-line front end driving the client
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no token storage. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, roles and tokens
//! - [`models`] - Wire models exchanged with the backend (users, carts, orders, products)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod models;
pub mod types;

pub use models::*;
pub use types::*;
