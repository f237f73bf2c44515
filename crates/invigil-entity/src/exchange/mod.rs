//! Duty exchange domain entities and the exchange state machine.

pub mod error;
pub mod machine;
pub mod model;
pub mod status;

pub use error::ExchangeError;
pub use machine::{NoticeWindow, Transition};
pub use model::Exchange;
pub use status::ExchangeStatus;
