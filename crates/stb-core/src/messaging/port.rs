use async_trait::async_trait;

use crate::{domain::ClientId, messaging::types::Keyboard, Result};

/// Outbound side of a messaging channel.
///
/// Implementations must bound each call by a timeout and must not retry on their own;
/// failures are surfaced to the caller as soft delivery failures.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, to: &ClientId, html: &str, keyboard: Option<&Keyboard>) -> Result<()>;
}
