use super::IDeliveryFailureRepo;
use crate::repos::shared::repo::StoreError;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use reminder_scheduler_domain::{DeliveryFailure, ID};
use sqlx::{types::Uuid, FromRow, PgPool};

pub struct PostgresDeliveryFailureRepo {
    pool: PgPool,
}

impl PostgresDeliveryFailureRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DeliveryFailureRaw {
    delivery_failure_uid: Uuid,
    reminder_uid: Uuid,
    reminder_kind: String,
    activation_instant: DateTime<Utc>,
    cause: String,
    reason: String,
    attempts: i32,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<DeliveryFailureRaw> for DeliveryFailure {
    type Error = anyhow::Error;

    fn try_from(e: DeliveryFailureRaw) -> anyhow::Result<Self> {
        Ok(Self {
            id: e.delivery_failure_uid.into(),
            reminder_id: e.reminder_uid.into(),
            reminder_kind: e.reminder_kind.parse().map_err(|e: String| anyhow!(e))?,
            activation_instant: e.activation_instant,
            cause: e.cause.parse().map_err(|e: String| anyhow!(e))?,
            reason: e.reason,
            attempts: u32::try_from(e.attempts)?,
            recorded_at: e.recorded_at,
        })
    }
}

#[async_trait::async_trait]
impl IDeliveryFailureRepo for PostgresDeliveryFailureRepo {
    async fn insert(&self, failure: &DeliveryFailure) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_failures
            (delivery_failure_uid, reminder_uid, reminder_kind, activation_instant, cause, reason, attempts, recorded_at)
            VALUES($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(failure.id.inner_ref())
        .bind(failure.reminder_id.inner_ref())
        .bind(failure.reminder_kind.as_str())
        .bind(failure.activation_instant)
        .bind(failure.cause.as_str())
        .bind(&failure.reason)
        .bind(i32::try_from(failure.attempts).unwrap_or(i32::MAX))
        .bind(failure.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(&format!("insert delivery failure: {:?}", failure), e))?;
        Ok(())
    }

    async fn find_by_reminder(&self, reminder_id: &ID) -> Result<Vec<DeliveryFailure>, StoreError> {
        let failures: Vec<DeliveryFailureRaw> = sqlx::query_as(
            r#"
            SELECT * FROM delivery_failures
            WHERE reminder_uid = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(reminder_id.inner_ref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            StoreError::unavailable(&format!("find delivery failures of: {}", reminder_id), e)
        })?;

        failures
            .into_iter()
            .map(|failure| DeliveryFailure::try_from(failure).map_err(StoreError::Unavailable))
            .collect()
    }
}
