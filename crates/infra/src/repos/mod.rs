mod delivery_failure;
mod reminder;
mod shared;

pub use delivery_failure::IDeliveryFailureRepo;
use delivery_failure::{InMemoryDeliveryFailureRepo, PostgresDeliveryFailureRepo};
pub use reminder::IReminderRepo;
use reminder::{InMemoryReminderRepo, PostgresReminderRepo};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

pub use shared::query_structs::*;
pub use shared::repo::StoreError;

#[derive(Clone)]
pub struct Repos {
    pub reminders: Arc<dyn IReminderRepo>,
    pub delivery_failures: Arc<dyn IDeliveryFailureRepo>,
}

impl Repos {
    pub async fn create_postgres(connection_string: &str) -> anyhow::Result<Self> {
        info!("DB CHECKING CONNECTION ...");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;
        info!("DB CHECKING CONNECTION ... [done]");
        Ok(Self {
            reminders: Arc::new(PostgresReminderRepo::new(pool.clone())),
            delivery_failures: Arc::new(PostgresDeliveryFailureRepo::new(pool)),
        })
    }

    pub fn create_inmemory() -> Self {
        Self {
            reminders: Arc::new(InMemoryReminderRepo::new()),
            delivery_failures: Arc::new(InMemoryDeliveryFailureRepo::new()),
        }
    }
}
