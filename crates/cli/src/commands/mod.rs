//! Command implementations. Each takes the [`Storefront`] built by `main`.
//!
//! [`Storefront`]: storefront_client::Storefront

pub mod account;
pub mod orders;
pub mod shop;
pub mod vendor;
