//! Outbound mail configuration.

use serde::{Deserialize, Serialize};

/// SMTP relay settings for exchange emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// When false, emails are rendered and logged but never sent.
    #[serde(default)]
    pub enabled: bool,
    /// SMTP relay hostname.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// SMTP relay port (STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Optional SMTP username.
    #[serde(default)]
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Delivery attempts per email before the job is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            from_address: default_from_address(),
            smtp_user: None,
            smtp_password: None,
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@invigil.local".to_string()
}

fn default_max_attempts() -> i32 {
    5
}
