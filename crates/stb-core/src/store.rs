use async_trait::async_trait;

use crate::{domain::*, Result};

/// Persistence port for tickets, their timelines and clients.
///
/// Every write is immediately visible to subsequent reads. Implementations enforce
/// "at most one ACTIVE ticket per client" themselves; callers only react to
/// [`crate::Error::ActiveTicketExists`].
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_active_ticket(&self, client: &ClientId) -> Result<Option<Ticket>>;

    /// Create an ACTIVE, in-progress ticket and upsert its client record.
    ///
    /// Fails with `ActiveTicketExists` when the client already owns an ACTIVE ticket.
    async fn create_ticket(&self, fields: NewTicket) -> Result<Ticket>;

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Newest first.
    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>>;

    /// Append to the ticket's timeline; message ids increase monotonically.
    async fn append_message(&self, ticket: TicketId, fields: NewMessage) -> Result<TicketMessage>;

    /// Apply a partial edit and report the status the ticket had before it.
    ///
    /// Setting ACTIVE while another ticket of the same client is ACTIVE fails with
    /// `ActiveTicketExists`.
    async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> Result<UpdatedTicket>;

    /// Ordered by message id (creation order).
    async fn list_messages(&self, ticket: TicketId) -> Result<Vec<TicketMessage>>;

    async fn get_client(&self, client: &ClientId) -> Result<Option<Client>>;

    /// Creates the client record when it does not exist yet.
    async fn set_client_blocked(&self, client: &ClientId, blocked: bool) -> Result<Client>;
}

/// Desired set of bot workers.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn active_bots(&self) -> Result<Vec<BotCredential>>;
}
