//! Attribution domain entities.

pub mod model;

pub use model::Attribution;
