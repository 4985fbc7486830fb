mod dispatcher;

pub use dispatcher::{DispatchError, IMessageDispatcher, WebhookDispatcher};
