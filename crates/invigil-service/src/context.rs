//! The actor on whose behalf a service call runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use invigil_core::error::AppError;
use invigil_entity::exchange::ExchangeError;
use invigil_entity::user::{Capability, UserRole};

/// Who is invoking a transition.
///
/// Resolved once at the request boundary and passed into every service
/// call. The expiry sweep acts as [`Actor::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Actor {
    /// An exam office administrator.
    Admin {
        /// The administrator's user account.
        user_id: Uuid,
    },
    /// A professor trading their own duties.
    Professor {
        /// The professor's user account.
        user_id: Uuid,
        /// The professor record the account is linked to.
        professor_id: Uuid,
    },
    /// The scheduler.
    System,
}

impl Actor {
    /// Build an actor from an authenticated user.
    ///
    /// Professors must be linked to a professor record.
    pub fn from_user(
        user_id: Uuid,
        role: UserRole,
        professor_id: Option<Uuid>,
    ) -> Result<Self, AppError> {
        match (role, professor_id) {
            (UserRole::Admin, _) => Ok(Self::Admin { user_id }),
            (UserRole::Professor, Some(professor_id)) => Ok(Self::Professor {
                user_id,
                professor_id,
            }),
            (UserRole::Professor, None) => Err(AppError::authorization(format!(
                "User {user_id} is not linked to a professor record"
            ))),
        }
    }

    /// The user role, if this is a human actor.
    pub fn role(&self) -> Option<UserRole> {
        match self {
            Self::Admin { .. } => Some(UserRole::Admin),
            Self::Professor { .. } => Some(UserRole::Professor),
            Self::System => None,
        }
    }

    /// The user account, if this is a human actor.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Admin { user_id } | Self::Professor { user_id, .. } => Some(*user_id),
            Self::System => None,
        }
    }

    /// The professor record, if the actor is a professor.
    pub fn professor_id(&self) -> Option<Uuid> {
        match self {
            Self::Professor { professor_id, .. } => Some(*professor_id),
            _ => None,
        }
    }

    /// Whether the actor holds `capability`. The system actor holds none.
    pub fn can(&self, capability: Capability) -> bool {
        self.role().is_some_and(|role| role.can(capability))
    }

    /// Return the acting professor, or `Forbidden` if the actor may not
    /// trade duties.
    pub fn trading_professor(&self, action: &str) -> Result<Uuid, ExchangeError> {
        match self.professor_id() {
            Some(id) if self.can(Capability::TradeDuties) => Ok(id),
            _ => Err(ExchangeError::Forbidden(format!(
                "Only professors may {action} an exchange"
            ))),
        }
    }

    /// Require `capability`, naming `action` in the error.
    pub fn require(&self, capability: Capability, action: &str) -> Result<(), ExchangeError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(ExchangeError::Forbidden(format!(
                "Not allowed to {action}"
            )))
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        match self {
            Self::Admin { user_id } => format!("admin:{user_id}"),
            Self::Professor { professor_id, .. } => format!("professor:{professor_id}"),
            Self::System => "system".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_professor_needs_link() {
        let user = Uuid::new_v4();
        assert!(Actor::from_user(user, UserRole::Professor, None).is_err());
        let actor = Actor::from_user(user, UserRole::Professor, Some(Uuid::nil())).unwrap();
        assert_eq!(actor.professor_id(), Some(Uuid::nil()));
        assert!(actor.trading_professor("create").is_ok());
    }

    #[test]
    fn test_admin_and_system_cannot_trade() {
        let admin = Actor::from_user(Uuid::new_v4(), UserRole::Admin, Some(Uuid::nil())).unwrap();
        assert!(matches!(
            admin.trading_professor("create"),
            Err(ExchangeError::Forbidden(_))
        ));
        assert!(admin.can(Capability::CancelAnyExchange));
        assert!(!Actor::System.can(Capability::CancelAnyExchange));
        assert_eq!(Actor::System.label(), "system");
    }
}
