use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{conversation::state::DialogueState, domain::ClientId};

type Slot = Arc<Mutex<Option<DialogueState>>>;

/// Per-client dialogue slots, each behind its own async mutex.
///
/// Holding a slot's guard serializes every update of that client; different clients never
/// contend beyond the brief map lookup.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<ClientId, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, client: &ClientId) -> OwnedMutexGuard<Option<DialogueState>> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(client.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Drop the client's entry if its dialogue ended and nobody else is waiting on it.
    pub async fn prune(&self, client: &ClientId) {
        let mut map = self.inner.lock().await;
        let Some(slot) = map.get(client) else {
            return;
        };
        if Arc::strong_count(slot) > 1 {
            return;
        }
        let idle = match slot.try_lock() {
            Ok(guard) => guard.is_none(),
            Err(_) => false,
        };
        if idle {
            map.remove(client);
        }
    }

    /// Current state without waiting on a busy slot.
    pub async fn peek(&self, client: &ClientId) -> Option<DialogueState> {
        let slot = self.inner.lock().await.get(client).cloned()?;
        let guard = slot.try_lock().ok()?;
        guard.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
