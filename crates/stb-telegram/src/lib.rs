//! Telegram adapter (teloxide).
//!
//! This crate implements the `stb-core` messaging and file ports over the Telegram Bot API,
//! plus the worker launcher the bot supervisor uses to run one long-polling dispatcher per bot.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode, ReplyMarkup},
};

use tokio::{io::AsyncWrite, time::timeout};

pub mod handlers;
pub mod router;

use stb_core::{
    domain::ClientId,
    errors::Error,
    media::{FileSource, RemoteFile},
    messaging::{port::MessagingPort, types::Keyboard},
    Result,
};

fn map_err(e: impl std::fmt::Display) -> Error {
    Error::External(format!("telegram error: {e}"))
}

fn tg_chat(to: &ClientId) -> Result<teloxide::types::ChatId> {
    to.as_str()
        .parse::<i64>()
        .map(teloxide::types::ChatId)
        .map_err(|_| Error::InvalidInput(format!("not a telegram chat id: {to}")))
}

fn reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Options(rows) => {
            let rows: Vec<Vec<KeyboardButton>> = rows
                .iter()
                .map(|row| row.iter().map(KeyboardButton::new).collect())
                .collect();
            ReplyMarkup::Keyboard(
                KeyboardMarkup::new(rows)
                    .resize_keyboard(true)
                    .one_time_keyboard(true),
            )
        }
        Keyboard::Remove => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
    }
}

/// Outbound messages. One call, one request, bounded by `timeout`; no retries.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    timeout: Duration,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, to: &ClientId, html: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut req = self
            .bot
            .send_message(tg_chat(to)?, html.to_string())
            .parse_mode(ParseMode::Html);
        if let Some(k) = keyboard {
            req = req.reply_markup(reply_markup(k));
        }

        match timeout(self.timeout, req.send()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(map_err(e)),
            Err(_) => Err(Error::External("telegram send timed out".to_string())),
        }
    }
}

/// `getFile` + file download for the media fetcher.
#[derive(Clone)]
pub struct TelegramFiles {
    bot: Bot,
}

impl TelegramFiles {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl FileSource for TelegramFiles {
    async fn lookup(&self, handle: &str) -> Result<RemoteFile> {
        let file = self
            .bot
            .get_file(handle.to_string())
            .await
            .map_err(map_err)?;
        // Telegram omits the size for some files; 0 means unknown here.
        let size = (file.meta.size > 0).then(|| u64::from(file.meta.size));
        Ok(RemoteFile {
            path: file.path,
            size,
        })
    }

    async fn fetch(&self, remote: &RemoteFile, dst: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        // A refused write aborts the download; the rest of the body is not read.
        self.bot
            .download_file(&remote.path, dst)
            .await
            .map_err(map_err)
    }
}
