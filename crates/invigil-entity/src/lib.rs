//! # invigil-entity
//!
//! Domain entity models for Invigil. Every struct in this crate represents
//! a database table row or a domain value object. The exchange state
//! machine lives here as pure transitions over these entities.

pub mod attribution;
pub mod exam;
pub mod exchange;
pub mod job;
pub mod mail;
pub mod notification;
pub mod professor;
pub mod user;
