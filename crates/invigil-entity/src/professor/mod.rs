//! Professor read model.

pub mod model;

pub use model::Professor;
