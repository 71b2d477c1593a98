//! # wbsync Common Library
//!
//! Shared code for the wbsync binaries:
//! - Common error type
//! - Bootstrap configuration loading
//! - SQLite database initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
