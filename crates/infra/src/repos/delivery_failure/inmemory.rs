use super::IDeliveryFailureRepo;
use crate::repos::shared::{inmemory_repo::*, repo::StoreError};
use reminder_scheduler_domain::{DeliveryFailure, ID};

pub struct InMemoryDeliveryFailureRepo {
    failures: std::sync::Mutex<Vec<DeliveryFailure>>,
}

impl InMemoryDeliveryFailureRepo {
    pub fn new() -> Self {
        Self {
            failures: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDeliveryFailureRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IDeliveryFailureRepo for InMemoryDeliveryFailureRepo {
    async fn insert(&self, failure: &DeliveryFailure) -> Result<(), StoreError> {
        insert(failure, &self.failures);
        Ok(())
    }

    async fn find_by_reminder(&self, reminder_id: &ID) -> Result<Vec<DeliveryFailure>, StoreError> {
        let mut failures = find_by(&self.failures, |f| f.reminder_id == *reminder_id);
        failures.sort_by_key(|f| f.recorded_at);
        Ok(failures)
    }
}
