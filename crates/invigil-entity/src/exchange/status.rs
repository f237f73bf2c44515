//! Exchange status enumeration and its transition table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a duty exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exchange_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    /// Offered by the requester, waiting for a counter-proposal.
    Open,
    /// A counter-proposal exists; the requester must decide.
    PendingRequesterDecision,
    /// The swap was accepted and the duties exchanged.
    Approved,
    /// The requester refused the counter-proposal.
    RefusedByRequester,
    /// The proposer took back their counter-proposal.
    WithdrawnByProposer,
    /// An administrator cancelled the exchange.
    CancelledByAdmin,
    /// The expiry sweep cancelled the exchange inside the notice window.
    CancelledAutoExpired,
}

impl ExchangeStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ExchangeStatus; 7] = [
        Self::Open,
        Self::PendingRequesterDecision,
        Self::Approved,
        Self::RefusedByRequester,
        Self::WithdrawnByProposer,
        Self::CancelledByAdmin,
        Self::CancelledAutoExpired,
    ];

    /// Statuses that still hold attribution locks.
    pub const ACTIVE: [ExchangeStatus; 2] = [Self::Open, Self::PendingRequesterDecision];

    /// Check if the exchange is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Check if the exchange is still open or pending.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::PendingRequesterDecision)
    }

    /// Whether `next` is a legal edge out of this status.
    pub fn can_transition_to(&self, next: ExchangeStatus) -> bool {
        use ExchangeStatus::*;
        matches!(
            (*self, next),
            (Open, PendingRequesterDecision)
                | (PendingRequesterDecision, Approved)
                | (PendingRequesterDecision, RefusedByRequester)
                | (PendingRequesterDecision, WithdrawnByProposer)
                | (Open | PendingRequesterDecision, CancelledByAdmin)
                | (Open | PendingRequesterDecision, CancelledAutoExpired)
        )
    }

    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PendingRequesterDecision => "pending_requester_decision",
            Self::Approved => "approved",
            Self::RefusedByRequester => "refused_by_requester",
            Self::WithdrawnByProposer => "withdrawn_by_proposer",
            Self::CancelledByAdmin => "cancelled_by_admin",
            Self::CancelledAutoExpired => "cancelled_auto_expired",
        }
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeStatus {
    type Err = invigil_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                invigil_core::AppError::validation(format!("Invalid exchange status: '{s}'"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ExchangeStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ExchangeStatus::ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{from} must not move to {to}"
                );
            }
        }
    }

    #[test]
    fn test_open_only_reaches_pending_or_cancellation() {
        let reachable: Vec<_> = ExchangeStatus::ALL
            .into_iter()
            .filter(|to| ExchangeStatus::Open.can_transition_to(*to))
            .collect();
        assert_eq!(
            reachable,
            vec![
                ExchangeStatus::PendingRequesterDecision,
                ExchangeStatus::CancelledByAdmin,
                ExchangeStatus::CancelledAutoExpired,
            ]
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "PENDING_REQUESTER_DECISION".parse::<ExchangeStatus>().unwrap(),
            ExchangeStatus::PendingRequesterDecision
        );
        assert!("closed".parse::<ExchangeStatus>().is_err());
    }
}
