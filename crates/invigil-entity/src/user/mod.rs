//! User roles and capabilities.

pub mod role;

pub use role::{Capability, UserRole};
