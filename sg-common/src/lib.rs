//! # ScopeGuard Common Library
//!
//! Shared code for the ScopeGuard service and its operator tooling:
//! - Database initialization and row models (users, projects, emails)
//! - Configuration loading (TOML bootstrap + environment overrides)
//! - API token generation and hashing
//! - Common error type

pub mod auth;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
