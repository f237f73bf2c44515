//! In-app notification reads and read receipts.

pub mod service;

pub use service::NotificationService;
