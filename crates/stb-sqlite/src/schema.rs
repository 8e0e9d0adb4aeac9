//! Table layout. Created on open; every statement is idempotent.

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    id          TEXT PRIMARY KEY,
    handle      TEXT,
    blocked     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tickets (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    subject       TEXT NOT NULL,
    category      TEXT NOT NULL,
    description   TEXT,
    client_id     TEXT NOT NULL REFERENCES clients(id),
    client_handle TEXT,
    status        TEXT NOT NULL DEFAULT 'active',
    resolution    TEXT NOT NULL DEFAULT 'in_progress',
    note          TEXT,
    priority      TEXT NOT NULL DEFAULT 'medium',
    assigned_to   INTEGER,
    bot_id        INTEGER,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- At most one ACTIVE ticket per client.
CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_one_active
    ON tickets(client_id) WHERE status = 'active';

CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status, id);

CREATE TABLE IF NOT EXISTS ticket_messages (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id         INTEGER NOT NULL REFERENCES tickets(id),
    sender            TEXT NOT NULL,
    kind              TEXT NOT NULL,
    content           TEXT,
    file_handle       TEXT,
    local_path        TEXT,
    original_filename TEXT,
    file_size         INTEGER,
    from_staff        INTEGER NOT NULL DEFAULT 0,
    sender_name       TEXT,
    sender_role       TEXT,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id, id);

CREATE TABLE IF NOT EXISTS bots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    token       TEXT NOT NULL UNIQUE,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);
"#;

pub(crate) fn init(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)
}
