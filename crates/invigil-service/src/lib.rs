//! # invigil-service
//!
//! Business logic service layer for Invigil. The exchange service runs
//! every duty-exchange transition as one unit of work; the expiry sweeper
//! drives imminent exchanges to their auto-expired state; the fan-out
//! turns each transition into in-app notifications and queued emails.
//!
//! Services follow constructor injection: all dependencies are provided
//! at construction time via `Arc` references.

pub mod context;
pub mod exchange;
pub mod mail;
pub mod notification;

pub use context::Actor;
pub use exchange::{ExchangeService, ExpirySweeper, Fanout, SweepReport, WithdrawOutcome};
pub use mail::{LogMailTransport, MailService, SmtpMailTransport};
pub use notification::NotificationService;
