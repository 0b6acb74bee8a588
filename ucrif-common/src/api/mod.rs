//! Shared HTTP API functionality
//!
//! Request authentication lives here as pure functions plus sqlx calls;
//! the service crate wraps them in Axum middleware. Keeping the framework
//! out of this module lets the hash and timestamp logic be unit tested
//! without an HTTP stack.

pub mod auth;

pub use auth::{
    calculate_hash, initialize_shared_secret, load_shared_secret, validate_hash,
    validate_timestamp, ApiAuthError,
};
