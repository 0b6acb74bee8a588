//! # UCRIF Common Library
//!
//! Shared code for the UCRIF novedades services including:
//! - Database schema, models and the record repository
//! - Group registry (one entry per organizational unit)
//! - Storage scope resolution (tenant-global or per-user)
//! - API request authentication
//! - Configuration loading
//! - Utility functions

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod groups;
pub mod scope;
pub mod time;

pub use error::{Error, Result};
pub use scope::{DocScope, ScopeStrategy};
