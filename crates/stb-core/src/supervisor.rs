//! One isolated worker per active bot credential, reconciled against the credential source.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    admin::RelayDirectory,
    domain::{BotCredential, BotId},
    relay::MessageRelay,
    store::CredentialSource,
    Result,
};

const STOP_GRACE: Duration = Duration::from_secs(5);

/// A started worker: its relay (for outbound staff traffic) and its task.
pub struct LaunchedWorker {
    pub relay: Arc<MessageRelay>,
    pub handle: JoinHandle<()>,
}

/// Starts one worker (own engine, sessions and messenger) for a credential.
///
/// The worker must stop once `cancel` fires.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, bot: &BotCredential, cancel: CancellationToken) -> Result<LaunchedWorker>;
}

struct RunningWorker {
    token: String,
    name: String,
    cancel: CancellationToken,
    relay: Arc<MessageRelay>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<BotId>,
    pub stopped: Vec<BotId>,
    /// Workers whose task had already exited.
    pub reaped: Vec<BotId>,
    pub failed: Vec<BotId>,
}

pub struct BotSupervisor {
    source: Arc<dyn CredentialSource>,
    launcher: Arc<dyn WorkerLauncher>,
    interval: Duration,
    workers: Mutex<HashMap<BotId, RunningWorker>>,
    /// One reconciliation pass at a time.
    reconciling: Mutex<()>,
}

impl BotSupervisor {
    pub fn new(
        source: Arc<dyn CredentialSource>,
        launcher: Arc<dyn WorkerLauncher>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            launcher,
            interval,
            workers: Mutex::new(HashMap::new()),
            reconciling: Mutex::new(()),
        }
    }

    /// Diff the desired set against the running set and converge.
    ///
    /// A credential source failure leaves the running set untouched. The worker map is only
    /// locked to compute the diff and to insert new workers; launches and stops run unlocked.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _pass = self.reconciling.lock().await;

        let desired: HashMap<BotId, BotCredential> = self
            .source
            .active_bots()
            .await?
            .into_iter()
            .filter(|b| b.active)
            .map(|b| (b.id, b))
            .collect();

        let mut report = ReconcileReport::default();

        let (obsolete, missing) = {
            let mut workers = self.workers.lock().await;

            let finished: Vec<BotId> = workers
                .iter()
                .filter(|(_, w)| w.handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            for id in finished {
                if let Some(w) = workers.remove(&id) {
                    warn!(bot = %id, name = %w.name, "bot worker exited; will restart if still active");
                    report.reaped.push(id);
                }
            }

            let stale: Vec<BotId> = workers
                .iter()
                .filter(|(id, w)| desired.get(id).map_or(true, |b| b.token != w.token))
                .map(|(id, _)| *id)
                .collect();
            let obsolete: Vec<(BotId, RunningWorker)> = stale
                .into_iter()
                .filter_map(|id| workers.remove(&id).map(|w| (id, w)))
                .collect();

            let mut missing: Vec<BotCredential> = desired
                .values()
                .filter(|b| !workers.contains_key(&b.id))
                .cloned()
                .collect();
            missing.sort_by_key(|b| b.id);

            (obsolete, missing)
        };

        for (id, w) in obsolete {
            info!(bot = %id, name = %w.name, "stopping bot worker");
            stop_worker(w).await;
            report.stopped.push(id);
        }

        for bot in missing {
            let cancel = CancellationToken::new();
            match self.launcher.launch(&bot, cancel.clone()).await {
                Ok(launched) => {
                    info!(bot = %bot.id, name = %bot.name, "bot worker started");
                    self.workers.lock().await.insert(
                        bot.id,
                        RunningWorker {
                            token: bot.token.clone(),
                            name: bot.name.clone(),
                            cancel,
                            relay: launched.relay,
                            handle: launched.handle,
                        },
                    );
                    report.started.push(bot.id);
                }
                Err(e) => {
                    error!(bot = %bot.id, name = %bot.name, "failed to start bot worker: {e}");
                    report.failed.push(bot.id);
                }
            }
        }

        Ok(report)
    }

    /// Reconcile now and then periodically until `shutdown` fires; then stop every worker.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    match self.reconcile().await {
                        Ok(r) if r != ReconcileReport::default() => {
                            info!(
                                started = r.started.len(),
                                stopped = r.stopped.len(),
                                reaped = r.reaped.len(),
                                failed = r.failed.len(),
                                "reconciled bot workers"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("failed to load bot credentials: {e}"),
                    }
                }
            }
        }
        self.stop_all().await;
    }

    pub async fn stop_all(&self) {
        let _pass = self.reconciling.lock().await;
        let drained: Vec<(BotId, RunningWorker)> = self.workers.lock().await.drain().collect();
        for (id, w) in drained {
            info!(bot = %id, name = %w.name, "stopping bot worker");
            stop_worker(w).await;
        }
    }

    pub async fn running(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = self.workers.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }
}

async fn stop_worker(w: RunningWorker) {
    w.cancel.cancel();
    let abort = w.handle.abort_handle();
    if timeout(STOP_GRACE, w.handle).await.is_err() {
        warn!(name = %w.name, "bot worker did not stop in time; aborting");
        abort.abort();
    }
}

#[async_trait]
impl RelayDirectory for BotSupervisor {
    async fn relay_for(&self, bot: Option<BotId>) -> Option<Arc<MessageRelay>> {
        let workers = self.workers.lock().await;
        let live = |w: &&RunningWorker| !w.handle.is_finished();

        if let Some(w) = bot.and_then(|id| workers.get(&id)).filter(live) {
            return Some(w.relay.clone());
        }
        let mut ids: Vec<&BotId> = workers.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| workers.get(id))
            .find(live)
            .map(|w| w.relay.clone())
    }
}
