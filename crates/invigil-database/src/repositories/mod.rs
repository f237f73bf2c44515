//! Repository implementations for the exchange tables.

pub mod exchange;
pub mod job;
pub mod notification;

pub use exchange::ExchangeRepository;
pub use job::JobRepository;
pub use notification::NotificationRepository;
