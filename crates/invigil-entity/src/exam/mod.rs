//! Exam read model.

pub mod model;

pub use model::Exam;
