//! Core traits defined in `invigil-core` and implemented by other crates.

pub mod mail;

pub use mail::{MailTransport, OutgoingMail};
