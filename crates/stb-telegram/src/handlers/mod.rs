//! Telegram update handlers.
//!
//! Each inbound message is translated into a channel-agnostic `InboundUpdate` and handed to
//! the worker's relay. Anything the intake flow cannot use becomes `Payload::Unsupported`.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use stb_core::{
    domain::{ClientId, MessageKind},
    messaging::types::{Command, InboundUpdate, MediaInput, Payload},
};

use crate::router::WorkerState;

pub async fn handle_message(msg: Message, state: Arc<WorkerState>) -> ResponseResult<()> {
    let Some(update) = to_inbound(&msg) else {
        debug!(chat = msg.chat.id.0, "ignoring non-private message");
        return Ok(());
    };
    state.relay.handle_inbound(update).await;
    Ok(())
}

/// Private chats only; group traffic never reaches the intake flow.
pub fn to_inbound(msg: &Message) -> Option<InboundUpdate> {
    if !msg.chat.is_private() {
        return None;
    }

    let client = ClientId::new(msg.chat.id.0.to_string());
    let mut update = InboundUpdate::new(client, payload(msg));
    if let Some(name) = msg.from().and_then(display_name) {
        update = update.with_display_name(name);
    }
    Some(update)
}

fn display_name(user: &teloxide::types::User) -> Option<String> {
    if let Some(u) = user.username.as_deref().filter(|u| !u.is_empty()) {
        return Some(format!("@{u}"));
    }
    let full = user.full_name();
    let full = full.trim();
    (!full.is_empty()).then(|| full.to_string())
}

fn payload(msg: &Message) -> Payload {
    if let Some(text) = msg.text() {
        return match Command::parse(text) {
            Some(cmd) => Payload::Command(cmd),
            None => Payload::Text(text.to_string()),
        };
    }

    let caption = msg.caption().map(str::to_string);

    // Telegram sends several sizes; the last one is the largest.
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return Payload::Media(MediaInput {
            kind: MessageKind::Photo,
            handle: best.file.id.clone(),
            caption,
            file_name: None,
        });
    }
    if let Some(video) = msg.video() {
        return Payload::Media(MediaInput {
            kind: MessageKind::Video,
            handle: video.file.id.clone(),
            caption,
            file_name: video.file_name.clone(),
        });
    }
    if let Some(doc) = msg.document() {
        return Payload::Media(MediaInput {
            kind: MessageKind::Document,
            handle: doc.file.id.clone(),
            caption,
            file_name: doc.file_name.clone(),
        });
    }

    Payload::Unsupported
}
