use reminder_scheduler_infra::ReminderContext;
use std::fmt::Debug;
use tracing::{error, info};

#[async_trait::async_trait]
pub trait UseCase: Debug + Send {
    type Response: Send;
    type Error: Send;

    const NAME: &'static str;

    async fn execute(&mut self, ctx: &ReminderContext) -> Result<Self::Response, Self::Error>;

    /// Errors which are part of normal operation, like a shutdown, are not
    /// logged as failures
    fn is_expected(_error: &Self::Error) -> bool {
        false
    }
}

#[tracing::instrument(name = "Executing usecase", skip(usecase, ctx), fields(usecase = U::NAME))]
pub async fn execute<U>(mut usecase: U, ctx: &ReminderContext) -> Result<U::Response, U::Error>
where
    U: UseCase,
    U::Error: Debug,
{
    let res = usecase.execute(ctx).await;

    match &res {
        Err(e) if U::is_expected(e) => info!("Use case stopped: {:?}", e),
        Err(e) => error!("Use case error: {:?}", e),
        Ok(_) => {}
    }

    res
}
