//! StateSet Checkout
//!
//! Turns a user's cart into an immutable order: prices are recomputed from
//! the catalog, stock is reserved with conditional writes, card payments are
//! re-verified against the gateway, and retries are made safe by an
//! idempotency key. Writes run inside a storage transaction when the backend
//! has one and in an explicitly flagged degraded mode when it does not.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod money;
pub mod repositories;
pub mod services;

pub use errors::CheckoutError;
pub use handlers::{app_router, AppState};
