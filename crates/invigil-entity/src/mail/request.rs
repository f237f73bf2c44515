//! Mail template identifiers and dispatch requests.

use serde::{Deserialize, Serialize};

/// The email templates of the exchange workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    /// A counter-proposal reached the requester.
    ProposalReceived,
    /// The requester approved or refused; context carries `outcome`.
    ExchangeOutcome,
    /// The proposer withdrew their counter-proposal.
    ProposalWithdrawn,
    /// The expiry sweep cancelled the exchange.
    AutoCancelled,
}

impl MailTemplate {
    /// Return the template identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalReceived => "proposal_received",
            Self::ExchangeOutcome => "exchange_outcome",
            Self::ProposalWithdrawn => "proposal_withdrawn",
            Self::AutoCancelled => "auto_cancelled",
        }
    }
}

impl std::fmt::Display for MailTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One email to dispatch: recipient, template, and its context bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailRequest {
    /// Recipient address.
    pub to: String,
    /// Template to render.
    pub template: MailTemplate,
    /// Values the template interpolates.
    pub context: serde_json::Value,
}
