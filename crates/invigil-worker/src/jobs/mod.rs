//! Job handler implementations.

pub mod expiry;
pub mod mail;
pub mod maintenance;

pub use expiry::ExpirySweepHandler;
pub use mail::ExchangeMailHandler;
pub use maintenance::MaintenanceCleanupHandler;
