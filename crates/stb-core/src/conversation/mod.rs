//! Ticket intake dialogue.
//!
//! [`state`] holds the pure state machine; [`ConversationEngine`] interprets its effects
//! against the ticket store and the media fetcher, one client at a time.

pub mod prompts;
pub mod sessions;
pub mod state;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::{BotId, Category, NewMessage, NewTicket, TicketId},
    errors::Error,
    media::MediaFetcher,
    messaging::types::{Command, InboundUpdate, MediaInput, Payload, Reply},
    store::TicketStore,
    Result,
};

use self::{
    sessions::SessionStore,
    state::{transition, DialogueState, Effect, Input, Next},
};

pub struct ConversationEngine {
    store: Arc<dyn TicketStore>,
    media: Arc<MediaFetcher>,
    sessions: SessionStore,
    audit: AuditLogger,
    bot_id: Option<BotId>,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        media: Arc<MediaFetcher>,
        audit: AuditLogger,
        bot_id: Option<BotId>,
    ) -> Self {
        Self {
            store,
            media,
            sessions: SessionStore::new(),
            audit,
            bot_id,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one inbound update and return the replies for the client, in order.
    ///
    /// Updates of the same client are serialized on its session slot.
    pub async fn handle(&self, update: &InboundUpdate) -> Vec<Reply> {
        let client = &update.client;

        match self.store.get_client(client).await {
            Ok(Some(c)) if c.blocked => {
                info!(client = %client, "ignoring update from blocked client");
                return vec![prompts::blocked()];
            }
            Ok(_) => {}
            Err(e) => {
                error!(client = %client, "client lookup failed: {e}");
                self.audit_failure(update, None, "client lookup failed", &e);
                return vec![prompts::please_retry()];
            }
        }

        let mut slot = self.sessions.lock(client).await;
        let mut replies = Vec::new();

        match &update.payload {
            Payload::Command(Command::Start) => {
                // Restart wins over whatever the client was doing.
                *slot = None;
                *slot = self.start(update, &mut replies).await;
            }
            Payload::Command(Command::Cancel) => {
                if slot.take().is_some() {
                    replies.push(prompts::cancelled());
                } else {
                    replies.push(prompts::nothing_to_cancel());
                }
            }
            payload => {
                let input = to_input(payload);
                match slot.clone() {
                    Some(current) => {
                        *slot = self.advance(update, current, input, &mut replies).await;
                    }
                    None => self.idle(update, input, &mut replies).await,
                }
            }
        }

        let ended = slot.is_none();
        drop(slot);
        if ended {
            self.sessions.prune(client).await;
        }
        replies
    }

    async fn start(&self, update: &InboundUpdate, replies: &mut Vec<Reply>) -> Option<DialogueState> {
        match self.store.find_active_ticket(&update.client).await {
            Ok(Some(ticket)) => {
                info!(client = %update.client, ticket = %ticket.id, "start redirected to active ticket");
                replies.push(prompts::existing_ticket(ticket.id));
                None
            }
            Ok(None) => {
                replies.push(prompts::category_menu());
                Some(DialogueState::ChoosingCategory)
            }
            Err(e) => {
                error!(client = %update.client, "active ticket lookup failed: {e}");
                self.audit_failure(update, None, "active ticket lookup failed", &e);
                replies.push(prompts::please_retry());
                None
            }
        }
    }

    /// Run one transition. On store failure the previous state is kept.
    async fn advance(
        &self,
        update: &InboundUpdate,
        current: DialogueState,
        input: Input,
        replies: &mut Vec<Reply>,
    ) -> Option<DialogueState> {
        let step = transition(&current, &input);

        for effect in step.effects {
            match effect {
                Effect::Reply(r) => replies.push(r),
                Effect::RecordText(text) => {
                    let Some(ticket) = current.ticket() else {
                        continue;
                    };
                    if let Err(e) = self.record_text(update, ticket, &text).await {
                        error!(client = %update.client, ticket = %ticket, "failed to record message: {e}");
                        self.audit_failure(update, Some(ticket), "failed to record message", &e);
                        replies.push(prompts::please_retry());
                        return Some(current);
                    }
                }
                Effect::RecordMedia(media) => {
                    let Some(ticket) = current.ticket() else {
                        continue;
                    };
                    if let Err(e) = self.record_media(update, ticket, &media, replies).await {
                        error!(client = %update.client, ticket = %ticket, "failed to record attachment: {e}");
                        self.audit_failure(update, Some(ticket), "failed to record attachment", &e);
                        replies.push(prompts::please_retry());
                        return Some(current);
                    }
                }
            }
        }

        match step.next {
            Next::Stay => Some(current),
            Next::Goto(next) => Some(next),
            Next::End => None,
            Next::OpenTicket(category) => self.open_ticket(update, category, current, replies).await,
        }
    }

    async fn open_ticket(
        &self,
        update: &InboundUpdate,
        category: Category,
        current: DialogueState,
        replies: &mut Vec<Reply>,
    ) -> Option<DialogueState> {
        let mut fields =
            NewTicket::for_category(update.client.clone(), update.display_name.clone(), category);
        fields.bot_id = self.bot_id;

        match self.store.create_ticket(fields).await {
            Ok(ticket) => {
                info!(client = %update.client, ticket = %ticket.id, category = category.code(), "ticket opened");
                self.audit
                    .record(AuditEvent::ticket_opened(&update.client, ticket.id, category.code()));
                let (next, reply) = DialogueState::opened(category, ticket.id);
                replies.push(reply);
                Some(next)
            }
            Err(Error::ActiveTicketExists(existing)) => {
                replies.push(prompts::existing_ticket(existing));
                None
            }
            Err(e) => {
                error!(client = %update.client, "failed to create ticket: {e}");
                self.audit_failure(update, None, "failed to create ticket", &e);
                replies.push(prompts::please_retry());
                Some(current)
            }
        }
    }

    /// No dialogue in progress: continue the active ticket if there is one.
    async fn idle(&self, update: &InboundUpdate, input: Input, replies: &mut Vec<Reply>) {
        if !matches!(input, Input::Text(_) | Input::Media(_)) {
            replies.push(prompts::use_start());
            return;
        }

        let ticket = match self.store.find_active_ticket(&update.client).await {
            Ok(Some(t)) => t.id,
            Ok(None) => {
                replies.push(prompts::use_start());
                return;
            }
            Err(e) => {
                error!(client = %update.client, "active ticket lookup failed: {e}");
                self.audit_failure(update, None, "active ticket lookup failed", &e);
                replies.push(prompts::please_retry());
                return;
            }
        };

        let recorded = match &input {
            Input::Text(text) if text.trim().is_empty() => {
                replies.push(prompts::use_start());
                return;
            }
            Input::Text(text) => self.record_text(update, ticket, text.trim()).await,
            Input::Media(media) => self.record_media(update, ticket, media, replies).await,
            _ => return,
        };

        match recorded {
            Ok(()) => replies.push(prompts::added_to_ticket(ticket)),
            Err(e) => {
                error!(client = %update.client, ticket = %ticket, "failed to append follow-up: {e}");
                self.audit_failure(update, Some(ticket), "failed to append follow-up", &e);
                replies.push(prompts::please_retry());
            }
        }
    }

    fn audit_failure(&self, update: &InboundUpdate, ticket: Option<TicketId>, context: &str, e: &Error) {
        let mut event = AuditEvent::error(Some(&update.client), &e.to_string(), Some(context));
        event.ticket = ticket.map(|t| t.0);
        self.audit.record(event);
    }

    async fn record_text(&self, update: &InboundUpdate, ticket: TicketId, text: &str) -> Result<()> {
        let msg = NewMessage::client_text(&update.client, update.display_name.clone(), text);
        self.store.append_message(ticket, msg).await?;
        self.audit.record(AuditEvent::message_recorded(
            &update.client,
            ticket,
            "text",
            Some(text),
        ));
        Ok(())
    }

    /// Download (soft failure) then append; a failed download still yields one message.
    async fn record_media(
        &self,
        update: &InboundUpdate,
        ticket: TicketId,
        media: &MediaInput,
        replies: &mut Vec<Reply>,
    ) -> Result<()> {
        let (local_path, original_filename, file_size) = match self
            .media
            .fetch(media.kind, &media.handle, media.file_name.as_deref())
            .await
        {
            Ok(stored) => (
                Some(stored.relative_path),
                stored.original_filename,
                Some(stored.size),
            ),
            Err(e) => {
                warn!(client = %update.client, ticket = %ticket, "attachment unavailable: {e}");
                self.audit.record(AuditEvent::media_unavailable(
                    &update.client,
                    ticket,
                    &e.to_string(),
                ));
                replies.push(prompts::media_not_stored());
                (None, media.file_name.clone(), None)
            }
        };

        let msg = NewMessage {
            sender: update.client.0.clone(),
            kind: media.kind,
            content: media.caption.clone(),
            file_handle: Some(media.handle.clone()),
            local_path,
            original_filename,
            file_size,
            from_staff: false,
            sender_name: update.display_name.clone(),
            sender_role: None,
        };
        self.store.append_message(ticket, msg).await?;
        self.audit.record(AuditEvent::message_recorded(
            &update.client,
            ticket,
            media.kind.code(),
            media.caption.as_deref(),
        ));
        Ok(())
    }
}

fn to_input(payload: &Payload) -> Input {
    match payload {
        Payload::Text(t) => Input::Text(t.clone()),
        Payload::Media(m) => Input::Media(m.clone()),
        Payload::Command(Command::Finish) => Input::Finish,
        Payload::Command(_) | Payload::Unsupported => Input::Unrecognized,
    }
}
