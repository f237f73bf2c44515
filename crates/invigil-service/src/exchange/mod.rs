//! Duty exchange services.

pub mod fanout;
pub mod service;
pub mod sweeper;

pub use fanout::{Fanout, FanoutPlan, TransitionOutcome};
pub use service::{ExchangeService, WithdrawOutcome};
pub use sweeper::{ExpirySweeper, SweepReport};
