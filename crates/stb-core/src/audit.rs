use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::{
    domain::{ClientId, TicketId},
    errors::Error,
    formatting::truncate_text,
    Result,
};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEvent {
    fn blank(event: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            client: None,
            ticket: None,
            message_type: None,
            content: None,
            sender: None,
            delivered: None,
            error: None,
            context: None,
        }
    }

    pub fn ticket_opened(client: &ClientId, ticket: TicketId, category: &str) -> Self {
        Self {
            client: Some(client.to_string()),
            ticket: Some(ticket.0),
            context: Some(category.to_string()),
            ..Self::blank("ticket_opened")
        }
    }

    pub fn message_recorded(
        client: &ClientId,
        ticket: TicketId,
        message_type: &str,
        content: Option<&str>,
    ) -> Self {
        Self {
            client: Some(client.to_string()),
            ticket: Some(ticket.0),
            message_type: Some(message_type.to_string()),
            content: content.map(|s| s.to_string()),
            ..Self::blank("message_recorded")
        }
    }

    pub fn media_unavailable(client: &ClientId, ticket: TicketId, reason: &str) -> Self {
        Self {
            client: Some(client.to_string()),
            ticket: Some(ticket.0),
            error: Some(reason.to_string()),
            ..Self::blank("media_unavailable")
        }
    }

    pub fn staff_reply(
        client: &ClientId,
        ticket: TicketId,
        sender: &str,
        content: &str,
        delivered: bool,
    ) -> Self {
        Self {
            client: Some(client.to_string()),
            ticket: Some(ticket.0),
            sender: Some(sender.to_string()),
            content: Some(content.to_string()),
            delivered: Some(delivered),
            ..Self::blank("staff_reply")
        }
    }

    pub fn closure_notice(client: &ClientId, ticket: TicketId, resolution: &str, delivered: bool) -> Self {
        Self {
            client: Some(client.to_string()),
            ticket: Some(ticket.0),
            context: Some(resolution.to_string()),
            delivered: Some(delivered),
            ..Self::blank("closure_notice")
        }
    }

    pub fn error(client: Option<&ClientId>, error: &str, context: Option<&str>) -> Self {
        Self {
            client: client.map(|c| c.to_string()),
            error: Some(error.to_string()),
            context: context.map(|s| s.to_string()),
            ..Self::blank("error")
        }
    }
}

/// Append-only audit trail. `None` path disables writing (tests, ad-hoc tools).
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: Option<PathBuf>,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: Some(path.into()),
            json,
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            json: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write and swallow failures; the triggering action must not abort on audit errors.
    pub fn record(&self, event: AuditEvent) {
        let name = event.event.clone();
        if let Err(e) = self.write(event) {
            warn!(event = %name, "audit write failed: {e}");
        }
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.error {
            event.error = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_audit_truncates_content() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), true);
        let content = "x".repeat(AUDIT_MAX_TEXT + 1);
        let ev = AuditEvent::message_recorded(&ClientId::new("7"), TicketId(3), "text", Some(&content));
        log.write(ev).unwrap();

        let written = std::fs::read_to_string(log.path().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(parsed["event"], "message_recorded");
        assert_eq!(parsed["ticket"], 3);
        assert!(parsed["content"].as_str().unwrap().ends_with("..."));
        assert!(parsed.get("sender").is_none());
    }

    #[test]
    fn plain_audit_writes_key_value_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), false);
        log.record(AuditEvent::staff_reply(
            &ClientId::new("7"),
            TicketId(3),
            "operator:5",
            "hello",
            false,
        ));

        let written = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(written.contains("event: staff_reply"));
        assert!(written.contains("sender: operator:5"));
        assert!(written.contains("delivered: false"));
    }

    #[test]
    fn record_swallows_write_failures() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for append.
        let log = AuditLogger::new(dir.path(), true);
        log.record(AuditEvent::error(None, "boom", None));
        assert!(log.write(AuditEvent::error(None, "boom", None)).is_err());
    }
}
