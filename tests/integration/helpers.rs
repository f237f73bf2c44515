//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use invigil_core::config::{ExchangeConfig, MailConfig};
use invigil_database::store::MemoryExchangeStore;
use invigil_entity::attribution::Attribution;
use invigil_entity::exam::Exam;
use invigil_entity::exchange::Exchange;
use invigil_entity::job::JobPayload;
use invigil_entity::mail::MailRequest;
use invigil_entity::professor::Professor;
use invigil_service::{Actor, ExchangeService, ExpirySweeper};

/// Test application context over the in-memory store.
pub struct TestApp {
    /// Seedable store with inspection accessors.
    pub store: Arc<MemoryExchangeStore>,
    /// Exchange transitions.
    pub exchanges: Arc<ExchangeService>,
    /// Expiry sweep.
    pub sweeper: ExpirySweeper,
}

/// A seeded professor and the actor acting as them.
#[derive(Debug, Clone)]
pub struct TestProfessor {
    pub professor: Professor,
    pub actor: Actor,
}

impl TestProfessor {
    pub fn id(&self) -> Uuid {
        self.professor.id
    }

    pub fn user_id(&self) -> Uuid {
        self.professor.user_id
    }
}

impl TestApp {
    /// Create a new test application with a 24h notice window.
    pub fn new() -> Self {
        let store = Arc::new(MemoryExchangeStore::new());
        let exchanges = Arc::new(ExchangeService::new(
            store.clone(),
            &ExchangeConfig::default(),
            &MailConfig::default(),
        ));
        let sweeper = ExpirySweeper::new(exchanges.clone());
        Self {
            store,
            exchanges,
            sweeper,
        }
    }

    /// Seed a professor.
    pub async fn professor(&self, first_name: &str) -> TestProfessor {
        let professor = Professor {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: "Tester".to_string(),
            email: format!("{}@example.edu", first_name.to_lowercase()),
        };
        self.store.insert_professor(professor.clone()).await;
        TestProfessor {
            actor: Actor::Professor {
                user_id: professor.user_id,
                professor_id: professor.id,
            },
            professor,
        }
    }

    /// Seed an exam starting `hours` from now.
    pub async fn exam_in(&self, label: &str, hours: i64) -> Exam {
        let exam = Exam {
            id: Uuid::new_v4(),
            label: label.to_string(),
            starts_at: Utc::now() + Duration::hours(hours),
        };
        self.store.insert_exam(exam.clone()).await;
        exam
    }

    /// Seed a duty of `holder` on `exam`.
    pub async fn duty(&self, holder: &TestProfessor, exam: &Exam) -> Attribution {
        let attribution = Attribution {
            id: Uuid::new_v4(),
            exam_id: exam.id,
            professor_id: holder.id(),
            room_id: None,
            is_responsable: false,
            is_involved_in_exchange: false,
        };
        self.store.insert_attribution(attribution.clone()).await;
        attribution
    }

    /// Current state of an attribution.
    pub async fn attribution(&self, id: Uuid) -> Attribution {
        self.store
            .attribution(id)
            .await
            .expect("attribution was seeded")
    }

    /// Current state of an exchange.
    pub async fn exchange(&self, id: Uuid) -> Exchange {
        use invigil_database::store::ExchangeStore;
        self.store
            .find_exchange(id)
            .await
            .expect("store read")
            .expect("exchange exists")
    }

    /// Every queued email, in enqueue order.
    pub async fn mails(&self) -> Vec<MailRequest> {
        self.store
            .jobs()
            .await
            .into_iter()
            .filter_map(|job| match job.typed_payload() {
                Ok(JobPayload::ExchangeMail(mail)) => Some(mail),
                _ => None,
            })
            .collect()
    }

    /// Assert that exactly the attributions referenced by an active
    /// exchange are locked.
    pub async fn assert_locks_match_active_exchanges(&self) {
        let referenced: HashSet<Uuid> = self
            .store
            .exchanges()
            .await
            .into_iter()
            .filter(|e| e.status.is_active())
            .flat_map(|e| e.attribution_ids())
            .collect();

        for attribution in self.store.attributions().await {
            assert_eq!(
                attribution.is_involved_in_exchange,
                referenced.contains(&attribution.id),
                "attribution {} lock flag disagrees with active exchanges",
                attribution.id
            );
        }
    }
}
