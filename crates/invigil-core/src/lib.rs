//! # invigil-core
//!
//! Core crate for Invigil. Contains configuration schemas,
//! pagination types, the mail transport trait, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other Invigil crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
