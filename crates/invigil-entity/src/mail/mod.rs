//! Mail dispatch requests.

pub mod request;

pub use request::{MailRequest, MailTemplate};
