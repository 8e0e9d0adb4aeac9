//! Bridge between the messaging channel and the ticket store.
//!
//! Inbound: provider update → [`ConversationEngine`] → replies pushed back to the client.
//! Outbound: staff replies and closure notices. The store write always happens first and is
//! never rolled back; delivery is best-effort and reported as [`Delivery`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    conversation::ConversationEngine,
    domain::{BotId, ClientId, NewMessage, StaffRef, Ticket, TicketId, TicketMessage, TicketUpdate},
    errors::Error,
    formatting::{format_closure_notice, format_staff_reply},
    messaging::{
        port::MessagingPort,
        types::{Delivery, InboundUpdate},
    },
    store::TicketStore,
    Result,
};

#[derive(Clone, Debug)]
pub struct StaffReplyOutcome {
    pub message: TicketMessage,
    pub delivery: Delivery,
}

#[derive(Clone, Debug)]
pub struct TicketUpdateOutcome {
    pub ticket: Ticket,
    /// Set only when this update archived an ACTIVE ticket.
    pub notification: Option<Delivery>,
}

/// Staff → client path. Without a messenger every push is reported as failed.
#[derive(Clone)]
pub struct Outbound {
    store: Arc<dyn TicketStore>,
    messenger: Option<Arc<dyn MessagingPort>>,
    audit: AuditLogger,
}

impl Outbound {
    pub fn new(
        store: Arc<dyn TicketStore>,
        messenger: Option<Arc<dyn MessagingPort>>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            messenger,
            audit,
        }
    }

    /// Record the reply on the ticket, then push it with the role prefix.
    pub async fn staff_reply(
        &self,
        ticket_id: TicketId,
        staff: &StaffRef,
        text: &str,
    ) -> Result<StaffReplyOutcome> {
        let body = text.trim();
        if body.is_empty() {
            return Err(Error::InvalidInput("reply text is empty".to_string()));
        }

        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| Error::ticket_not_found(ticket_id))?;

        let message = self
            .store
            .append_message(ticket_id, NewMessage::staff_text(staff, body))
            .await?;

        let delivery = self
            .push(&ticket.client, &format_staff_reply(staff.role, body))
            .await;

        info!(
            ticket = %ticket_id,
            client = %ticket.client,
            sender = %message.sender,
            delivered = delivery.is_delivered(),
            "staff reply recorded"
        );
        self.audit.record(AuditEvent::staff_reply(
            &ticket.client,
            ticket_id,
            &message.sender,
            body,
            delivery.is_delivered(),
        ));

        Ok(StaffReplyOutcome { message, delivery })
    }

    /// Apply a staff edit; notify the client exactly once on the ACTIVE → ARCHIVED edge.
    pub async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> Result<TicketUpdateOutcome> {
        let updated = self.store.update_ticket(id, update).await?;

        let notification = if updated.was_archived_now() {
            let ticket = &updated.ticket;
            let delivery = self
                .push(&ticket.client, &format_closure_notice(ticket))
                .await;
            info!(ticket = %id, client = %ticket.client, delivered = delivery.is_delivered(), "ticket archived");
            self.audit.record(AuditEvent::closure_notice(
                &ticket.client,
                id,
                ticket.resolution.code(),
                delivery.is_delivered(),
            ));
            Some(delivery)
        } else {
            None
        };

        Ok(TicketUpdateOutcome {
            ticket: updated.ticket,
            notification,
        })
    }

    pub async fn push(&self, to: &ClientId, html: &str) -> Delivery {
        let Some(messenger) = &self.messenger else {
            warn!(client = %to, "no running bot worker to deliver message");
            return Delivery::Failed("no running bot worker".to_string());
        };
        match messenger.send_html(to, html, None).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                warn!(client = %to, "delivery failed: {e}");
                Delivery::Failed(e.to_string())
            }
        }
    }
}

/// One worker's relay: its own engine and messenger over the shared store.
pub struct MessageRelay {
    engine: Arc<ConversationEngine>,
    messenger: Arc<dyn MessagingPort>,
    outbound: Outbound,
    bot_id: Option<BotId>,
}

impl MessageRelay {
    pub fn new(
        engine: Arc<ConversationEngine>,
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn TicketStore>,
        audit: AuditLogger,
        bot_id: Option<BotId>,
    ) -> Self {
        let outbound = Outbound::new(store, Some(messenger.clone()), audit);
        Self {
            engine,
            messenger,
            outbound,
            bot_id,
        }
    }

    pub fn bot_id(&self) -> Option<BotId> {
        self.bot_id
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Dispatch an inbound update and push the engine's replies in order.
    pub async fn handle_inbound(&self, update: InboundUpdate) {
        let replies = self.engine.handle(&update).await;
        debug!(client = %update.client, replies = replies.len(), "update handled");

        for reply in replies {
            if let Err(e) = self
                .messenger
                .send_html(&update.client, &reply.text, reply.keyboard.as_ref())
                .await
            {
                warn!(client = %update.client, "failed to send reply: {e}");
            }
        }
    }

    pub async fn staff_reply(
        &self,
        ticket: TicketId,
        staff: &StaffRef,
        text: &str,
    ) -> Result<StaffReplyOutcome> {
        self.outbound.staff_reply(ticket, staff, text).await
    }

    pub async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> Result<TicketUpdateOutcome> {
        self.outbound.update_ticket(id, update).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        conversation::prompts,
        domain::{Category, Resolution, StaffRole, TicketStatus},
        media::MediaFetcher,
        messaging::types::{Command, Payload},
        testing::{FakeFiles, FakeMessenger, FakeStore},
    };

    fn relay(store: Arc<FakeStore>, messenger: Arc<FakeMessenger>) -> MessageRelay {
        let media = Arc::new(MediaFetcher::new(
            Arc::new(FakeFiles::new()),
            std::env::temp_dir().join("stb-relay-tests"),
            1024,
            Duration::from_secs(1),
        ));
        let engine = Arc::new(ConversationEngine::new(
            store.clone(),
            media,
            AuditLogger::disabled(),
            Some(BotId(1)),
        ));
        MessageRelay::new(engine, messenger, store, AuditLogger::disabled(), Some(BotId(1)))
    }

    fn operator() -> StaffRef {
        StaffRef {
            role: StaffRole::Operator,
            staff_id: Some(5),
            display_name: Some("Ann".to_string()),
        }
    }

    #[tokio::test]
    async fn inbound_replies_are_pushed_in_order() {
        let store = Arc::new(FakeStore::new());
        let messenger = Arc::new(FakeMessenger::new());
        let relay = relay(store, messenger.clone());

        let client = ClientId::new("100");
        relay
            .handle_inbound(InboundUpdate::new(client.clone(), Payload::Command(Command::Start)))
            .await;

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, client);
        assert_eq!(sent[0].html, prompts::category_menu().text);
        assert!(sent[0].keyboard.is_some());
    }

    #[tokio::test]
    async fn staff_reply_records_and_pushes_with_prefix() {
        let store = Arc::new(FakeStore::new());
        let messenger = Arc::new(FakeMessenger::new());
        let relay = relay(store.clone(), messenger.clone());
        let client = ClientId::new("100");
        let ticket = store.seed_active(&client, Category::Dispute);

        let out = relay
            .staff_reply(ticket, &operator(), "please resend photo")
            .await
            .unwrap();
        assert_eq!(out.delivery, Delivery::Delivered);

        let msgs = store.messages(ticket);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].from_staff);
        assert_eq!(msgs[0].content.as_deref(), Some("please resend photo"));
        assert_eq!(msgs[0].sender, "operator:5");
        assert_eq!(msgs[0].sender_role, Some(StaffRole::Operator));

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, client);
        assert!(sent[0].html.starts_with("<b>Operator:</b>"));
    }

    #[tokio::test]
    async fn failed_push_keeps_the_record() {
        let store = Arc::new(FakeStore::new());
        let messenger = Arc::new(FakeMessenger::new());
        messenger.set_failing(true);
        let relay = relay(store.clone(), messenger.clone());
        let ticket = store.seed_active(&ClientId::new("100"), Category::Dispute);

        let out = relay.staff_reply(ticket, &operator(), "hi").await.unwrap();
        assert!(matches!(out.delivery, Delivery::Failed(_)));
        assert_eq!(store.messages(ticket).len(), 1);
    }

    #[tokio::test]
    async fn empty_or_unknown_ticket_replies_are_rejected() {
        let store = Arc::new(FakeStore::new());
        let relay = relay(store.clone(), Arc::new(FakeMessenger::new()));
        let ticket = store.seed_active(&ClientId::new("100"), Category::Dispute);

        let err = relay.staff_reply(ticket, &operator(), "   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let err = relay.staff_reply(TicketId(999), &operator(), "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(store.messages(ticket).is_empty());
    }

    #[tokio::test]
    async fn archiving_notifies_exactly_once() {
        let store = Arc::new(FakeStore::new());
        let messenger = Arc::new(FakeMessenger::new());
        let relay = relay(store.clone(), messenger.clone());
        let ticket = store.seed_active(&ClientId::new("100"), Category::PaymentDispute);

        let out = relay
            .update_ticket(
                ticket,
                TicketUpdate {
                    status: Some(TicketStatus::Archived),
                    resolution: Some(Resolution::Refunded),
                    ..TicketUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.notification, Some(Delivery::Delivered));
        assert_eq!(out.ticket.status, TicketStatus::Archived);

        let out = relay
            .update_ticket(
                ticket,
                TicketUpdate {
                    note: Some(Some("customer happy".to_string())),
                    ..TicketUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.notification, None);

        // Archiving an already archived ticket is not a new edge either.
        let out = relay
            .update_ticket(
                ticket,
                TicketUpdate {
                    status: Some(TicketStatus::Archived),
                    ..TicketUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.notification, None);

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains("refund"));
    }

    #[tokio::test]
    async fn outbound_without_messenger_reports_failure() {
        let store = Arc::new(FakeStore::new());
        let outbound = Outbound::new(store.clone(), None, AuditLogger::disabled());
        let ticket = store.seed_active(&ClientId::new("100"), Category::Dispute);

        let out = outbound
            .staff_reply(ticket, &StaffRef::new(StaffRole::Admin), "hello")
            .await
            .unwrap();
        assert!(matches!(out.delivery, Delivery::Failed(_)));
        assert_eq!(store.messages(ticket)[0].sender, "admin");
    }
}
