//! Mini App identity gateway library.
//!
//! This crate provides the HTTP perimeter as a library, allowing the router
//! to be driven end-to-end in tests against the in-memory stores.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::app;
pub use state::AppState;
