use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stb_core::{
    audit::AuditLogger,
    config::Config,
    conversation::ConversationEngine,
    domain::BotCredential,
    errors::Error,
    media::MediaFetcher,
    messaging::port::MessagingPort,
    relay::MessageRelay,
    store::TicketStore,
    supervisor::{LaunchedWorker, WorkerLauncher},
    Result,
};

use crate::{handlers, TelegramFiles, TelegramMessenger};

/// Per-worker dependencies injected into the dispatcher.
pub struct WorkerState {
    pub relay: Arc<MessageRelay>,
}

/// Starts one long-polling dispatcher per bot credential.
///
/// Every worker gets its own engine (and so its own sessions), messenger and file source;
/// the ticket store and audit log are shared.
pub struct TelegramLauncher {
    cfg: Arc<Config>,
    store: Arc<dyn TicketStore>,
    audit: AuditLogger,
}

impl TelegramLauncher {
    pub fn new(cfg: Arc<Config>, store: Arc<dyn TicketStore>, audit: AuditLogger) -> Self {
        Self { cfg, store, audit }
    }
}

#[async_trait]
impl WorkerLauncher for TelegramLauncher {
    async fn launch(&self, cred: &BotCredential, cancel: CancellationToken) -> Result<LaunchedWorker> {
        let bot = Bot::new(cred.token.clone());

        // A bad token fails here instead of inside the polling loop.
        let me = match timeout(self.cfg.provider_timeout, bot.get_me().send()).await {
            Ok(Ok(me)) => me,
            Ok(Err(e)) => return Err(Error::External(format!("getMe failed: {e}"))),
            Err(_) => return Err(Error::External("getMe timed out".to_string())),
        };
        info!(bot = %cred.id, username = %me.username(), "telegram bot authenticated");

        let media = Arc::new(MediaFetcher::new(
            Arc::new(TelegramFiles::new(bot.clone())),
            self.cfg.media_dir.clone(),
            self.cfg.max_media_bytes,
            self.cfg.provider_timeout,
        ));
        let engine = Arc::new(ConversationEngine::new(
            self.store.clone(),
            media,
            self.audit.clone(),
            Some(cred.id),
        ));
        let messenger: Arc<dyn MessagingPort> =
            Arc::new(TelegramMessenger::new(bot.clone(), self.cfg.provider_timeout));
        let relay = Arc::new(MessageRelay::new(
            engine,
            messenger,
            self.store.clone(),
            self.audit.clone(),
            Some(cred.id),
        ));

        let state = Arc::new(WorkerState {
            relay: relay.clone(),
        });
        let handler =
            dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

        let mut dispatcher = Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![state])
            .build();
        let shutdown = dispatcher.shutdown_token();

        let name = cred.name.clone();
        let handle = tokio::spawn(async move {
            let requested = cancel.clone();
            let stopper = tokio::spawn(async move {
                cancel.cancelled().await;
                // The token refuses to shut down a dispatcher that is not running yet.
                loop {
                    match shutdown.shutdown() {
                        Ok(done) => {
                            done.await;
                            break;
                        }
                        Err(_) => sleep(Duration::from_millis(100)).await,
                    }
                }
            });

            dispatcher.dispatch().await;
            stopper.abort();
            if requested.is_cancelled() {
                info!(name = %name, "telegram dispatcher stopped");
            } else {
                warn!(name = %name, "telegram dispatcher exited unexpectedly");
            }
        });

        Ok(LaunchedWorker { relay, handle })
    }
}
