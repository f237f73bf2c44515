//! Notification type tags.

use serde::{Deserialize, Serialize};

/// Type tag of an in-app notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone answered the recipient's exchange request.
    ExchangeProposalReceived,
    /// The exchange was approved and duties swapped.
    ExchangeApproved,
    /// The requester refused the recipient's counter-proposal.
    ExchangeRefused,
    /// The proposer withdrew their counter-proposal.
    ExchangeWithdrawn,
    /// An administrator cancelled the exchange.
    ExchangeCancelledByAdmin,
    /// The exchange expired inside the notice window.
    ExchangeAutoExpired,
}

impl NotificationKind {
    /// Return the tag as stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExchangeProposalReceived => "exchange_proposal_received",
            Self::ExchangeApproved => "exchange_approved",
            Self::ExchangeRefused => "exchange_refused",
            Self::ExchangeWithdrawn => "exchange_withdrawn",
            Self::ExchangeCancelledByAdmin => "exchange_cancelled_by_admin",
            Self::ExchangeAutoExpired => "exchange_auto_expired",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
