//! Hand-written fakes for the ports, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::{
    audit::AuditLogger,
    conversation::ConversationEngine,
    domain::*,
    errors::Error,
    media::{FileSource, MediaFetcher, RemoteFile},
    messaging::{port::MessagingPort, types::Keyboard},
    relay::MessageRelay,
    store::{CredentialSource, TicketStore},
    supervisor::{LaunchedWorker, WorkerLauncher},
    Result,
};

// ============== Store ==============

#[derive(Default)]
struct FakeState {
    tickets: Vec<Ticket>,
    messages: Vec<TicketMessage>,
    clients: HashMap<ClientId, Client>,
    next_ticket: i64,
    next_message: i64,
}

impl FakeState {
    fn active_for(&self, client: &ClientId, except: Option<TicketId>) -> Option<TicketId> {
        self.tickets
            .iter()
            .find(|t| &t.client == client && t.is_active() && Some(t.id) != except)
            .map(|t| t.id)
    }

    fn insert_ticket(&mut self, fields: NewTicket) -> Ticket {
        self.next_ticket += 1;
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId(self.next_ticket),
            subject: fields.subject,
            category: fields.category,
            description: fields.description,
            client: fields.client.clone(),
            client_handle: fields.client_handle.clone(),
            status: TicketStatus::Active,
            resolution: Resolution::InProgress,
            note: None,
            priority: fields.priority,
            assigned_to: None,
            bot_id: fields.bot_id,
            created_at: now,
            updated_at: now,
        };
        let client = self
            .clients
            .entry(fields.client.clone())
            .or_insert_with(|| Client {
                id: fields.client.clone(),
                handle: None,
                blocked: false,
            });
        if fields.client_handle.is_some() {
            client.handle = fields.client_handle;
        }
        self.tickets.push(ticket.clone());
        ticket
    }
}

/// In-memory store with the same single-active-ticket rule as the SQLite one.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<FakeState>,
    failing: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with `Error::Store`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state.lock().unwrap().tickets.clone()
    }

    pub fn messages(&self, ticket: TicketId) -> Vec<TicketMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket)
            .cloned()
            .collect()
    }

    pub fn seed_active(&self, client: &ClientId, category: Category) -> TicketId {
        self.state
            .lock()
            .unwrap()
            .insert_ticket(NewTicket::for_category(client.clone(), None, category))
            .id
    }

    fn check_writable(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for FakeStore {
    async fn find_active_ticket(&self, client: &ClientId) -> Result<Option<Ticket>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .tickets
            .iter()
            .find(|t| &t.client == client && t.is_active())
            .cloned())
    }

    async fn create_ticket(&self, fields: NewTicket) -> Result<Ticket> {
        self.check_writable()?;
        let mut st = self.state.lock().unwrap();
        if let Some(existing) = st.active_for(&fields.client, None) {
            return Err(Error::ActiveTicketExists(existing));
        }
        Ok(st.insert_ticket(fields))
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let st = self.state.lock().unwrap();
        Ok(st.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let st = self.state.lock().unwrap();
        let mut out: Vec<Ticket> = st
            .tickets
            .iter()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.client.as_ref().map_or(true, |c| &t.client == c))
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn append_message(&self, ticket: TicketId, fields: NewMessage) -> Result<TicketMessage> {
        self.check_writable()?;
        let mut st = self.state.lock().unwrap();
        if !st.tickets.iter().any(|t| t.id == ticket) {
            return Err(Error::ticket_not_found(ticket));
        }
        st.next_message += 1;
        let msg = TicketMessage {
            id: MessageId(st.next_message),
            ticket_id: ticket,
            sender: fields.sender,
            kind: fields.kind,
            content: fields.content,
            file_handle: fields.file_handle,
            local_path: fields.local_path,
            original_filename: fields.original_filename,
            file_size: fields.file_size,
            from_staff: fields.from_staff,
            sender_name: fields.sender_name,
            sender_role: fields.sender_role,
            created_at: Utc::now(),
        };
        st.messages.push(msg.clone());
        Ok(msg)
    }

    async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> Result<UpdatedTicket> {
        self.check_writable()?;
        let mut st = self.state.lock().unwrap();
        let Some(pos) = st.tickets.iter().position(|t| t.id == id) else {
            return Err(Error::ticket_not_found(id));
        };
        if update.status == Some(TicketStatus::Active) {
            let client = st.tickets[pos].client.clone();
            if let Some(other) = st.active_for(&client, Some(id)) {
                return Err(Error::ActiveTicketExists(other));
            }
        }

        let t = &mut st.tickets[pos];
        let previous_status = t.status;
        if let Some(s) = update.status {
            t.status = s;
        }
        if let Some(r) = update.resolution {
            t.resolution = r;
        }
        if let Some(n) = update.note {
            t.note = n;
        }
        if let Some(p) = update.priority {
            t.priority = p;
        }
        if let Some(a) = update.assigned_to {
            t.assigned_to = a;
        }
        t.updated_at = Utc::now();

        Ok(UpdatedTicket {
            ticket: t.clone(),
            previous_status,
        })
    }

    async fn list_messages(&self, ticket: TicketId) -> Result<Vec<TicketMessage>> {
        Ok(self.messages(ticket))
    }

    async fn get_client(&self, client: &ClientId) -> Result<Option<Client>> {
        Ok(self.state.lock().unwrap().clients.get(client).cloned())
    }

    async fn set_client_blocked(&self, client: &ClientId, blocked: bool) -> Result<Client> {
        self.check_writable()?;
        let mut st = self.state.lock().unwrap();
        let c = st.clients.entry(client.clone()).or_insert_with(|| Client {
            id: client.clone(),
            handle: None,
            blocked: false,
        });
        c.blocked = blocked;
        Ok(c.clone())
    }
}

// ============== Messenger ==============

#[derive(Clone, Debug)]
pub(crate) struct SentMessage {
    pub to: ClientId,
    pub html: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
pub(crate) struct FakeMessenger {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, to: &ClientId, html: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::External("chat not found".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            to: to.clone(),
            html: html.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }
}

// ============== Files ==============

struct FakeFile {
    path: String,
    size: Option<u64>,
    bytes: Vec<u8>,
}

/// File source backed by a map of handles.
#[derive(Default)]
pub(crate) struct FakeFiles {
    files: HashMap<String, FakeFile>,
    broken: HashSet<String>,
    fetches: Arc<AtomicUsize>,
    sent: Arc<AtomicUsize>,
}

impl FakeFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, handle: &str, path: &str, size: Option<u64>, bytes: &[u8]) -> Self {
        self.files.insert(
            handle.to_string(),
            FakeFile {
                path: path.to_string(),
                size,
                bytes: bytes.to_vec(),
            },
        );
        self
    }

    /// Transfers of `handle` write half the bytes and then fail.
    pub fn failing_transfer(mut self, handle: &str) -> Self {
        self.broken.insert(handle.to_string());
        self
    }

    pub fn fetch_count(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }

    /// Bytes accepted by destinations so far.
    pub fn bytes_sent(&self) -> Arc<AtomicUsize> {
        self.sent.clone()
    }
}

#[async_trait]
impl FileSource for FakeFiles {
    async fn lookup(&self, handle: &str) -> Result<RemoteFile> {
        let f = self
            .files
            .get(handle)
            .ok_or_else(|| Error::External(format!("file {handle} not found")))?;
        Ok(RemoteFile {
            path: f.path.clone(),
            size: f.size,
        })
    }

    async fn fetch(&self, remote: &RemoteFile, dst: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (handle, f) = self
            .files
            .iter()
            .find(|(_, f)| f.path == remote.path)
            .ok_or_else(|| Error::External("unknown remote path".to_string()))?;

        let body = if self.broken.contains(handle) {
            &f.bytes[..f.bytes.len() / 2]
        } else {
            &f.bytes[..]
        };
        // Chunked like a network body.
        for chunk in body.chunks(4) {
            dst.write_all(chunk).await?;
            self.sent.fetch_add(chunk.len(), Ordering::SeqCst);
        }
        if self.broken.contains(handle) {
            return Err(Error::External("connection reset".to_string()));
        }
        Ok(())
    }
}

// ============== Supervisor ==============

#[derive(Default)]
pub(crate) struct FakeCredentials {
    bots: Mutex<Vec<BotCredential>>,
    failing: AtomicBool,
}

impl FakeCredentials {
    pub fn new(bots: Vec<BotCredential>) -> Self {
        Self {
            bots: Mutex::new(bots),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set(&self, bots: Vec<BotCredential>) {
        *self.bots.lock().unwrap() = bots;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn active_bots(&self) -> Result<Vec<BotCredential>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("no such table: bots".to_string()));
        }
        Ok(self.bots.lock().unwrap().clone())
    }
}

/// Launches workers that idle until cancelled (or crashed on demand).
#[derive(Default)]
pub(crate) struct FakeLauncher {
    store: Arc<FakeStore>,
    launched: Mutex<Vec<String>>,
    cancelled: Arc<Mutex<Vec<BotId>>>,
    failing: Mutex<HashSet<String>>,
    crashes: Mutex<HashMap<BotId, CancellationToken>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_token(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_string());
    }

    /// Make every launch for `token` take `delay` before it returns.
    pub fn delay_token(&self, token: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(token.to_string(), delay);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn launched_tokens(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    /// Bots whose worker observed cancellation, in order.
    pub fn cancelled(&self) -> Vec<BotId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// End the worker's task without a cancellation request.
    pub fn crash(&self, bot: BotId) {
        if let Some(t) = self.crashes.lock().unwrap().get(&bot) {
            t.cancel();
        }
    }
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn launch(&self, bot: &BotCredential, cancel: CancellationToken) -> Result<LaunchedWorker> {
        let delay = self.delays.lock().unwrap().get(&bot.token).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.lock().unwrap().contains(&bot.token) {
            return Err(Error::External("Unauthorized".to_string()));
        }
        self.launched.lock().unwrap().push(bot.token.clone());

        let media = Arc::new(MediaFetcher::new(
            Arc::new(FakeFiles::new()),
            std::env::temp_dir().join("stb-fake-launcher"),
            1024,
            Duration::from_secs(1),
        ));
        let engine = Arc::new(ConversationEngine::new(
            self.store.clone(),
            media,
            AuditLogger::disabled(),
            Some(bot.id),
        ));
        let relay = Arc::new(MessageRelay::new(
            engine,
            Arc::new(FakeMessenger::new()),
            self.store.clone(),
            AuditLogger::disabled(),
            Some(bot.id),
        ));

        let crash = CancellationToken::new();
        self.crashes.lock().unwrap().insert(bot.id, crash.clone());
        let cancelled = self.cancelled.clone();
        let id = bot.id;
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled.lock().unwrap().push(id);
                }
                _ = crash.cancelled() => {}
            }
        });

        Ok(LaunchedWorker { relay, handle })
    }
}
