//! Staff-facing library boundary consumed by the admin API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    audit::AuditLogger,
    domain::{
        BotId, Client, ClientId, NewTicket, StaffRef, Ticket, TicketFilter, TicketId,
        TicketMessage, TicketUpdate,
    },
    errors::Error,
    relay::{MessageRelay, Outbound, StaffReplyOutcome, TicketUpdateOutcome},
    store::TicketStore,
    Result,
};

/// Finds the running relay that should carry outbound traffic for a ticket.
#[async_trait]
pub trait RelayDirectory: Send + Sync {
    /// Prefer the worker for `bot`, else any running worker.
    async fn relay_for(&self, bot: Option<BotId>) -> Option<Arc<MessageRelay>>;
}

#[derive(Clone, Debug)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
    pub client: Option<Client>,
}

pub struct StaffDesk {
    store: Arc<dyn TicketStore>,
    directory: Arc<dyn RelayDirectory>,
    audit: AuditLogger,
}

impl StaffDesk {
    pub fn new(
        store: Arc<dyn TicketStore>,
        directory: Arc<dyn RelayDirectory>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            directory,
            audit,
        }
    }

    pub async fn reply(&self, ticket: TicketId, staff: &StaffRef, text: &str) -> Result<StaffReplyOutcome> {
        let outbound = self.outbound_for(ticket).await?;
        outbound.staff_reply(ticket, staff, text).await
    }

    pub async fn update_ticket(&self, ticket: TicketId, update: TicketUpdate) -> Result<TicketUpdateOutcome> {
        if update.is_empty() {
            return Err(Error::InvalidInput("nothing to update".to_string()));
        }
        let outbound = self.outbound_for(ticket).await?;
        outbound.update_ticket(ticket, update).await
    }

    /// Create a ticket on behalf of a client, bypassing the dialogue.
    pub async fn open_ticket(&self, fields: NewTicket) -> Result<Ticket> {
        if fields.subject.trim().is_empty() {
            return Err(Error::InvalidInput("subject is empty".to_string()));
        }
        let ticket = self.store.create_ticket(fields).await?;
        info!(ticket = %ticket.id, client = %ticket.client, "ticket opened by staff");
        Ok(ticket)
    }

    pub async fn ticket_details(&self, ticket: TicketId) -> Result<TicketDetails> {
        let t = self
            .store
            .get_ticket(ticket)
            .await?
            .ok_or_else(|| Error::ticket_not_found(ticket))?;
        let messages = self.store.list_messages(ticket).await?;
        let client = self.store.get_client(&t.client).await?;
        Ok(TicketDetails {
            ticket: t,
            messages,
            client,
        })
    }

    pub async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        self.store.list_tickets(filter).await
    }

    pub async fn set_client_blocked(&self, client: &ClientId, blocked: bool) -> Result<Client> {
        let c = self.store.set_client_blocked(client, blocked).await?;
        info!(client = %client, blocked, "client block flag changed");
        Ok(c)
    }

    /// Route through the worker that opened the ticket; fall back to any running worker.
    async fn outbound_for(&self, ticket: TicketId) -> Result<Outbound> {
        let t = self
            .store
            .get_ticket(ticket)
            .await?
            .ok_or_else(|| Error::ticket_not_found(ticket))?;

        Ok(match self.directory.relay_for(t.bot_id).await {
            Some(relay) => relay.outbound().clone(),
            None => Outbound::new(self.store.clone(), None, self.audit.clone()),
        })
    }
}
