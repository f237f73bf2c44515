//! Expiry sweep job.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use invigil_core::error::AppError;
use invigil_entity::job::Job;
use invigil_entity::job::payload::EXCHANGE_EXPIRY_SWEEP;
use invigil_service::ExpirySweeper;

use crate::executor::{JobExecutionError, JobHandler};

/// Runs one expiry sweep and stores its report as the job result.
#[derive(Debug)]
pub struct ExpirySweepHandler {
    sweeper: ExpirySweeper,
}

impl ExpirySweepHandler {
    /// Create a new sweep handler
    pub fn new(sweeper: ExpirySweeper) -> Self {
        Self { sweeper }
    }
}

#[async_trait]
impl JobHandler for ExpirySweepHandler {
    fn job_type(&self) -> &str {
        EXCHANGE_EXPIRY_SWEEP
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        // Per-exchange failures are already counted in the report; only a
        // failed candidate query reaches here.
        let report = self
            .sweeper
            .run(Utc::now())
            .await
            .map_err(|e| JobExecutionError::Transient(format!("Expiry sweep failed: {e}")))?;

        let report = serde_json::to_value(report).map_err(AppError::from)?;
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use uuid::Uuid;

    use invigil_core::config::{ExchangeConfig, MailConfig};
    use invigil_database::store::MemoryExchangeStore;
    use invigil_entity::attribution::Attribution;
    use invigil_entity::exam::Exam;
    use invigil_entity::professor::Professor;
    use invigil_service::{Actor, ExchangeService};

    use super::*;
    use crate::executor::tests::job_with;

    #[tokio::test]
    async fn test_sweep_job_reports_expired_exchanges() {
        let store = Arc::new(MemoryExchangeStore::new());
        let exchanges = Arc::new(ExchangeService::new(
            store.clone(),
            &ExchangeConfig::default(),
            &MailConfig::default(),
        ));

        let professor = Professor {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.edu".to_string(),
        };
        let exam = Exam {
            id: Uuid::new_v4(),
            label: "Analysis".to_string(),
            starts_at: Utc::now() + Duration::hours(48),
        };
        let duty = Attribution {
            id: Uuid::new_v4(),
            exam_id: exam.id,
            professor_id: professor.id,
            room_id: None,
            is_responsable: false,
            is_involved_in_exchange: false,
        };
        store.insert_professor(professor.clone()).await;
        store.insert_exam(exam.clone()).await;
        store.insert_attribution(duty.clone()).await;

        let actor = Actor::Professor {
            user_id: professor.user_id,
            professor_id: professor.id,
        };
        exchanges.create(&actor, duty.id, None).await.unwrap();
        store
            .set_exam_start(exam.id, Utc::now() + Duration::hours(6))
            .await;

        let handler = ExpirySweepHandler::new(ExpirySweeper::new(exchanges));
        let result = handler
            .execute(&job_with(EXCHANGE_EXPIRY_SWEEP, serde_json::json!({})))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["candidates"], 1);
        assert_eq!(result["expired"], 1);
        assert_eq!(result["failed"], 0);
        assert!(!store.attribution(duty.id).await.unwrap().is_involved_in_exchange);
    }
}
