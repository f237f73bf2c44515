//! User role enumeration and the capabilities each role grants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Roles known to the exchange workflow.
///
/// Resolved once at the request boundary; the core never inspects role
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Exam office administrator.
    Admin,
    /// Teaching staff holding invigilation duties.
    Professor,
}

/// Something an actor may do in the exchange workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Offer own duties and answer other requests.
    TradeDuties,
    /// Cancel any active exchange.
    CancelAnyExchange,
    /// List every exchange regardless of participants.
    ViewAllExchanges,
}

impl UserRole {
    /// The capabilities granted by this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Admin => &[Capability::CancelAnyExchange, Capability::ViewAllExchanges],
            Self::Professor => &[Capability::TradeDuties],
        }
    }

    /// Check if this role grants `capability`.
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Check if this role is an admin.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Professor => "professor",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = invigil_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "professor" => Ok(Self::Professor),
            _ => Err(invigil_core::AppError::validation(format!(
                "Invalid user role: '{s}'. Expected one of: admin, professor"
            ))),
        }
    }
}
