mod inmemory;
mod postgres;

use super::shared::repo::StoreError;
pub use inmemory::InMemoryDeliveryFailureRepo;
pub use postgres::PostgresDeliveryFailureRepo;
use reminder_scheduler_domain::{DeliveryFailure, ID};

#[async_trait::async_trait]
pub trait IDeliveryFailureRepo: Send + Sync {
    async fn insert(&self, failure: &DeliveryFailure) -> Result<(), StoreError>;
    /// Every failure recorded for the reminder, oldest first
    async fn find_by_reminder(&self, reminder_id: &ID) -> Result<Vec<DeliveryFailure>, StoreError>;
}
