//! Core type definitions used across the Invigil workspace.

pub mod pagination;

pub use pagination::{PageRequest, PageResponse};
