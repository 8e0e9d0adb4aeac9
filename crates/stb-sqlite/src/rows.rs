//! Row ↔ domain conversions.

use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Row};
use stb_core::domain::*;

pub(crate) const TICKET_COLUMNS: &str = "id, subject, category, description, client_id, client_handle, \
     status, resolution, note, priority, assigned_to, bot_id, created_at, updated_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, ticket_id, sender, kind, content, file_handle, local_path, \
     original_filename, file_size, from_staff, sender_name, sender_role, created_at";

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

fn invalid(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(idx, format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let category: String = row.get(2)?;
    let status: String = row.get(6)?;
    let resolution: String = row.get(7)?;
    let priority: String = row.get(9)?;

    Ok(Ticket {
        id: TicketId(row.get(0)?),
        subject: row.get(1)?,
        category: Category::from_code(&category)
            .ok_or_else(|| invalid(2, format!("unknown category {category:?}")))?,
        description: row.get(3)?,
        client: ClientId(row.get(4)?),
        client_handle: row.get(5)?,
        status: TicketStatus::from_code(&status)
            .ok_or_else(|| invalid(6, format!("unknown status {status:?}")))?,
        resolution: Resolution::from_code(&resolution),
        note: row.get(8)?,
        priority: Priority::from_code(&priority).unwrap_or_default(),
        assigned_to: row.get(10)?,
        bot_id: row.get::<_, Option<i64>>(11)?.map(BotId),
        created_at: timestamp(row, 12)?,
        updated_at: timestamp(row, 13)?,
    })
}

pub(crate) fn message(row: &Row<'_>) -> rusqlite::Result<TicketMessage> {
    let kind: String = row.get(3)?;
    let role: Option<String> = row.get(11)?;

    Ok(TicketMessage {
        id: MessageId(row.get(0)?),
        ticket_id: TicketId(row.get(1)?),
        sender: row.get(2)?,
        kind: MessageKind::from_code(&kind)
            .ok_or_else(|| invalid(3, format!("unknown message kind {kind:?}")))?,
        content: row.get(4)?,
        file_handle: row.get(5)?,
        local_path: row.get(6)?,
        original_filename: row.get(7)?,
        file_size: row
            .get::<_, Option<i64>>(8)?
            .and_then(|s| u64::try_from(s).ok()),
        from_staff: row.get(9)?,
        sender_name: row.get(10)?,
        sender_role: role.as_deref().and_then(StaffRole::from_code),
        created_at: timestamp(row, 12)?,
    })
}

pub(crate) fn client(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: ClientId(row.get(0)?),
        handle: row.get(1)?,
        blocked: row.get(2)?,
    })
}

pub(crate) fn bot(row: &Row<'_>) -> rusqlite::Result<BotCredential> {
    Ok(BotCredential {
        id: BotId(row.get(0)?),
        name: row.get(1)?,
        token: row.get(2)?,
        active: row.get(3)?,
    })
}
