use std::sync::Arc;

use stb_core::{
    audit::AuditLogger, config::Config, store::TicketStore, supervisor::BotSupervisor,
};
use stb_sqlite::SqliteStore;
use stb_telegram::router::TelegramLauncher;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), stb_core::Error> {
    stb_core::logging::init("stb")?;

    let cfg = Arc::new(Config::load()?);
    let store = Arc::new(SqliteStore::open(&cfg.database_path).await?);

    // A token in the environment is registered as a bot; the bots table is the source of truth.
    if let Some(token) = &cfg.telegram_bot_token {
        let bot = store.register_bot(&cfg.telegram_bot_name, token).await?;
        info!(bot = %bot.id, name = %bot.name, active = bot.active, "bot credential registered");
    }

    let audit = AuditLogger::new(cfg.audit_log_path.clone(), cfg.audit_log_json);
    let tickets: Arc<dyn TicketStore> = store.clone();
    let launcher = Arc::new(TelegramLauncher::new(cfg.clone(), tickets, audit));
    let supervisor = BotSupervisor::new(store, launcher, cfg.reconcile_interval);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {e}");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        });
    }

    info!(
        database = %cfg.database_path.display(),
        media = %cfg.media_dir.display(),
        "support bot supervisor started"
    );
    supervisor.run(shutdown).await;
    info!("all bot workers stopped");

    Ok(())
}
