mod telemetry;

use reminder_scheduler_api::{Application, SchedulerError};
use reminder_scheduler_infra::{run_migration, setup_context, WebhookDispatcher};
use std::sync::Arc;
use telemetry::{get_subscriber, init_subscriber};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("reminder_scheduler".into(), "info".into());
    init_subscriber(subscriber)?;

    run_migration().await?;
    let context = setup_context().await?;

    let webhook_url = std::env::var("DISPATCH_WEBHOOK_URL")
        .map_err(|_| anyhow::anyhow!("DISPATCH_WEBHOOK_URL env var to be present."))?;
    let webhook_key = std::env::var("DISPATCH_WEBHOOK_KEY").ok();
    let dispatcher = Arc::new(WebhookDispatcher::new(webhook_url, webhook_key));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for the shutdown signal: {:?}", e);
            return;
        }
        info!("Received shutdown signal");
        shutdown.cancel();
    });

    let app = Application::new(context, dispatcher);
    match app.start(cancel).await {
        Ok(()) | Err(SchedulerError::Cancelled) => {
            info!("Reminder scheduler stopped");
            Ok(())
        }
    }
}
