//! Precondition failures of exchange transitions.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use invigil_core::error::{AppError, ErrorKind};

use super::status::ExchangeStatus;

/// Why an exchange transition was rejected.
///
/// Every business variant is raised before any mutation, so a rejected
/// transition never leaves partial state behind.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The exchange is not in a state that allows the transition.
    #[error("Exchange {exchange_id} is {status}; cannot {action}")]
    InvalidState {
        /// The exchange.
        exchange_id: Uuid,
        /// Its current status.
        status: ExchangeStatus,
        /// The attempted transition.
        action: &'static str,
    },

    /// The attribution is already held by another active exchange.
    #[error("Attribution {0} is already involved in an active exchange")]
    AttributionLocked(Uuid),

    /// The exam starts inside the notice window.
    #[error("Exam '{exam_label}' starts at {starts_at}, inside the {notice_hours}h notice window")]
    TooCloseToExam {
        /// Exam label.
        exam_label: String,
        /// Exam start.
        starts_at: DateTime<Utc>,
        /// Configured notice window in hours.
        notice_hours: i64,
    },

    /// The acting professor does not own what the transition requires.
    #[error("{0}")]
    NotOwner(String),

    /// A professor tried to swap a duty with themselves.
    #[error("A professor cannot answer their own exchange request")]
    SameProfessor,

    /// Both duties are on the same exam.
    #[error("Both attributions belong to exam {0}; nothing would change")]
    SameExam(Uuid),

    /// The actor lacks the capability for this transition.
    #[error("{0}")]
    Forbidden(String),

    /// A referenced exchange, attribution, exam or professor is missing.
    #[error("{0}")]
    NotFound(String),

    /// Persistence failed; the whole transition was rolled back.
    #[error(transparent)]
    Store(#[from] AppError),
}

impl ExchangeError {
    /// Short machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid_state",
            Self::AttributionLocked(_) => "attribution_locked",
            Self::TooCloseToExam { .. } => "too_close_to_exam",
            Self::NotOwner(_) => "not_owner",
            Self::SameProfessor => "same_professor",
            Self::SameExam(_) => "same_exam",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store",
        }
    }
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        let kind = match &err {
            ExchangeError::InvalidState { .. } | ExchangeError::AttributionLocked(_) => {
                ErrorKind::Conflict
            }
            ExchangeError::TooCloseToExam { .. }
            | ExchangeError::SameProfessor
            | ExchangeError::SameExam(_) => ErrorKind::Validation,
            ExchangeError::NotOwner(_) | ExchangeError::Forbidden(_) => ErrorKind::Authorization,
            ExchangeError::NotFound(_) => ErrorKind::NotFound,
            ExchangeError::Store(inner) => return inner.clone(),
        };
        AppError::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failed_precondition() {
        let id = Uuid::nil();
        let err = ExchangeError::InvalidState {
            exchange_id: id,
            status: ExchangeStatus::Approved,
            action: "propose",
        };
        assert_eq!(
            err.to_string(),
            format!("Exchange {id} is approved; cannot propose")
        );
        assert!(
            ExchangeError::AttributionLocked(id)
                .to_string()
                .contains("already involved")
        );
    }

    #[test]
    fn test_maps_to_app_error_kinds() {
        let locked: AppError = ExchangeError::AttributionLocked(Uuid::nil()).into();
        assert_eq!(locked.kind, ErrorKind::Conflict);

        let owner: AppError = ExchangeError::NotOwner("not yours".into()).into();
        assert_eq!(owner.kind, ErrorKind::Authorization);

        let store: AppError = ExchangeError::Store(AppError::database("boom")).into();
        assert_eq!(store.kind, ErrorKind::Database);
        assert_eq!(store.message, "boom");
    }
}
