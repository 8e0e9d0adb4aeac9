//! SQLite-backed ticket store and bot credential source.
//!
//! All access goes through one `tokio_rusqlite::Connection`, i.e. one background thread
//! owning one SQLite connection. That single writer is what makes the
//! check-then-insert in `create_ticket` race-free; the partial unique index on
//! `tickets(client_id) WHERE status = 'active'` backs it up at the schema level.

mod rows;
mod schema;

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use stb_core::{
    domain::*,
    store::{CredentialSource, TicketStore},
    Error, Result,
};
use tokio_rusqlite::Connection;
use tracing::info;

use crate::rows::{now, MESSAGE_COLUMNS, TICKET_COLUMNS};

fn map_db_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> Error {
    Error::Store(e.to_string())
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path).await.map_err(|e| map_db_err(e.into()))?;
        conn.call(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
            schema::init(conn)?;
            Ok(())
        })
        .await
        .map_err(map_db_err)?;

        info!(path = %path.display(), "ticket store opened");
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await.map_err(|e| map_db_err(e.into()))?;
        conn.call(|conn| {
            schema::init(conn)?;
            Ok(())
        })
        .await
        .map_err(map_db_err)?;
        Ok(Self { conn })
    }

    /// Insert a bot credential, or return the existing one for the same token.
    ///
    /// Re-registering keeps the stored `active` flag and updates the name.
    pub async fn register_bot(&self, name: &str, token: &str) -> Result<BotCredential> {
        let name = name.trim().to_string();
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(Error::InvalidInput("bot token is empty".to_string()));
        }

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO bots (name, token, active, created_at) VALUES (?1, ?2, 1, ?3)
                     ON CONFLICT(token) DO UPDATE SET name = excluded.name",
                    params![name, token, now()],
                )?;
                conn.query_row(
                    "SELECT id, name, token, active FROM bots WHERE token = ?1",
                    params![token],
                    rows::bot,
                )
            })
            .await
            .map_err(map_db_err)
    }

    pub async fn set_bot_active(&self, id: BotId, active: bool) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE bots SET active = ?1 WHERE id = ?2",
                    params![active, id.0],
                )
            })
            .await
            .map_err(map_db_err)?;
        if changed == 0 {
            return Err(Error::NotFound {
                what: "bot",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn list_bots(&self) -> Result<Vec<BotCredential>> {
        self.conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, token, active FROM bots ORDER BY id")?;
                let bots = stmt
                    .query_map([], rows::bot)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(bots)
            })
            .await
            .map_err(map_db_err)
    }
}

fn select_ticket(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Ticket>> {
    conn.query_row(
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
        params![id],
        rows::ticket,
    )
    .optional()
}

fn active_ticket_id(
    conn: &rusqlite::Connection,
    client: &str,
    except: Option<i64>,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM tickets WHERE client_id = ?1 AND status = 'active' AND id != ?2",
        params![client, except.unwrap_or(0)],
        |row| row.get(0),
    )
    .optional()
}

#[async_trait]
impl TicketStore for SqliteStore {
    async fn find_active_ticket(&self, client: &ClientId) -> Result<Option<Ticket>> {
        let client = client.0.clone();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {TICKET_COLUMNS} FROM tickets WHERE client_id = ?1 AND status = 'active'"
                    ),
                    params![client],
                    rows::ticket,
                )
                .optional()
            })
            .await
            .map_err(map_db_err)
    }

    async fn create_ticket(&self, fields: NewTicket) -> Result<Ticket> {
        let created = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if let Some(existing) = active_ticket_id(&tx, &fields.client.0, None)? {
                    return Ok(Err(TicketId(existing)));
                }

                let ts = now();
                tx.execute(
                    "INSERT INTO clients (id, handle, blocked, created_at) VALUES (?1, ?2, 0, ?3)
                     ON CONFLICT(id) DO UPDATE SET handle = COALESCE(excluded.handle, clients.handle)",
                    params![fields.client.0, fields.client_handle, ts],
                )?;
                tx.execute(
                    "INSERT INTO tickets (subject, category, description, client_id, client_handle,
                         status, resolution, priority, bot_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'active', 'in_progress', ?6, ?7, ?8, ?8)",
                    params![
                        fields.subject,
                        fields.category.code(),
                        fields.description,
                        fields.client.0,
                        fields.client_handle,
                        fields.priority.code(),
                        fields.bot_id.map(|b| b.0),
                        ts,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                let ticket = select_ticket(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                tx.commit()?;
                Ok(Ok(ticket))
            })
            .await
            .map_err(map_db_err)?;

        created.map_err(Error::ActiveTicketExists)
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.conn
            .call(move |conn| select_ticket(conn, id.0))
            .await
            .map_err(map_db_err)
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let status = filter.status.map(|s| s.code().to_string());
        let client = filter.client.as_ref().map(|c| c.0.clone());
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets
                     WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR client_id = ?2)
                     ORDER BY id DESC"
                ))?;
                let tickets = stmt
                    .query_map(params![status, client], rows::ticket)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tickets)
            })
            .await
            .map_err(map_db_err)
    }

    async fn append_message(&self, ticket: TicketId, fields: NewMessage) -> Result<TicketMessage> {
        let inserted = self
            .conn
            .call(move |conn| {
                if select_ticket(conn, ticket.0)?.is_none() {
                    return Ok(None);
                }
                conn.execute(
                    "INSERT INTO ticket_messages (ticket_id, sender, kind, content, file_handle,
                         local_path, original_filename, file_size, from_staff, sender_name,
                         sender_role, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        ticket.0,
                        fields.sender,
                        fields.kind.code(),
                        fields.content,
                        fields.file_handle,
                        fields.local_path,
                        fields.original_filename,
                        fields.file_size.and_then(|s| i64::try_from(s).ok()),
                        fields.from_staff,
                        fields.sender_name,
                        fields.sender_role.map(|r| r.code()),
                        now(),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                conn.execute(
                    "UPDATE tickets SET updated_at = ?1 WHERE id = ?2",
                    params![now(), ticket.0],
                )?;
                conn.query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM ticket_messages WHERE id = ?1"),
                    params![id],
                    rows::message,
                )
                .map(Some)
            })
            .await
            .map_err(map_db_err)?;

        inserted.ok_or_else(|| Error::ticket_not_found(ticket))
    }

    async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> Result<UpdatedTicket> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut ticket) = select_ticket(&tx, id.0)? else {
                    return Ok(Err(Error::ticket_not_found(id)));
                };
                if update.status == Some(TicketStatus::Active) {
                    if let Some(other) = active_ticket_id(&tx, &ticket.client.0, Some(id.0))? {
                        return Ok(Err(Error::ActiveTicketExists(TicketId(other))));
                    }
                }

                let previous_status = ticket.status;
                if let Some(s) = update.status {
                    ticket.status = s;
                }
                if let Some(r) = update.resolution {
                    ticket.resolution = r;
                }
                if let Some(n) = update.note {
                    ticket.note = n;
                }
                if let Some(p) = update.priority {
                    ticket.priority = p;
                }
                if let Some(a) = update.assigned_to {
                    ticket.assigned_to = a;
                }

                tx.execute(
                    "UPDATE tickets SET status = ?1, resolution = ?2, note = ?3, priority = ?4,
                         assigned_to = ?5, updated_at = ?6
                     WHERE id = ?7",
                    params![
                        ticket.status.code(),
                        ticket.resolution.code(),
                        ticket.note,
                        ticket.priority.code(),
                        ticket.assigned_to,
                        now(),
                        id.0,
                    ],
                )?;
                let ticket = select_ticket(&tx, id.0)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                tx.commit()?;
                Ok(Ok(UpdatedTicket {
                    ticket,
                    previous_status,
                }))
            })
            .await
            .map_err(map_db_err)?
    }

    async fn list_messages(&self, ticket: TicketId) -> Result<Vec<TicketMessage>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM ticket_messages WHERE ticket_id = ?1 ORDER BY id ASC"
                ))?;
                let messages = stmt
                    .query_map(params![ticket.0], rows::message)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(messages)
            })
            .await
            .map_err(map_db_err)
    }

    async fn get_client(&self, client: &ClientId) -> Result<Option<Client>> {
        let client = client.0.clone();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, handle, blocked FROM clients WHERE id = ?1",
                    params![client],
                    rows::client,
                )
                .optional()
            })
            .await
            .map_err(map_db_err)
    }

    async fn set_client_blocked(&self, client: &ClientId, blocked: bool) -> Result<Client> {
        let client = client.0.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO clients (id, blocked, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET blocked = excluded.blocked",
                    params![client, blocked, now()],
                )?;
                conn.query_row(
                    "SELECT id, handle, blocked FROM clients WHERE id = ?1",
                    params![client],
                    rows::client,
                )
            })
            .await
            .map_err(map_db_err)
    }
}

#[async_trait]
impl CredentialSource for SqliteStore {
    async fn active_bots(&self) -> Result<Vec<BotCredential>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, token, active FROM bots WHERE active = 1 ORDER BY id",
                )?;
                let bots = stmt
                    .query_map([], rows::bot)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(bots)
            })
            .await
            .map_err(map_db_err)
    }
}
