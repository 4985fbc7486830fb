use reminder_scheduler_domain::Message;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Delivery might succeed if attempted again
    #[error("Transient dispatch failure: {0}")]
    Transient(String),
    /// Delivery of this message will never succeed
    #[error("Permanent dispatch failure: {0}")]
    Permanent(String),
}

/// Delivers a `Message` to the chat service
#[async_trait::async_trait]
pub trait IMessageDispatcher: Send + Sync {
    async fn dispatch(&self, message: &Message) -> Result<(), DispatchError>;
}

/// Dispatcher that hands the message to a chat service bridge listening on a webhook
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
    key: Option<String>,
}

impl WebhookDispatcher {
    pub const KEY_HEADER: &'static str = "reminder-scheduler-webhook-key";

    pub fn new(url: String, key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            key,
        }
    }
}

fn classify(status: StatusCode) -> Result<(), DispatchError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(DispatchError::Transient(format!(
            "Webhook responded with status: {}",
            status
        )))
    } else {
        Err(DispatchError::Permanent(format!(
            "Webhook responded with status: {}",
            status
        )))
    }
}

#[async_trait::async_trait]
impl IMessageDispatcher for WebhookDispatcher {
    async fn dispatch(&self, message: &Message) -> Result<(), DispatchError> {
        let mut request = self.client.post(&self.url).json(message);
        if let Some(key) = &self.key {
            request = request.header(Self::KEY_HEADER, key);
        }

        let res = request.send().await.map_err(|e| {
            warn!("Error calling the dispatch webhook: {:?}", e);
            DispatchError::Transient(e.to_string())
        })?;
        classify(res.status())
    }
}
