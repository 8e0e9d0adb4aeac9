//! Text helpers for outbound messages (Telegram HTML parse mode).

use crate::domain::{Resolution, StaffRole, Ticket};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Truncate to `max_len` characters, appending `...` when something was cut.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Staff reply as the client sees it: role label, then the escaped body.
pub fn format_staff_reply(role: StaffRole, text: &str) -> String {
    format!("<b>{}:</b> {}", role.label(), escape_html(text.trim()))
}

/// Client-facing notice sent once when a ticket is archived.
pub fn format_closure_notice(ticket: &Ticket) -> String {
    let outcome = match &ticket.resolution {
        Resolution::Refunded => "A refund has been issued for this case.".to_string(),
        Resolution::Refused => "After review, your request was declined.".to_string(),
        Resolution::InProgress => "The case has been closed by our team.".to_string(),
        Resolution::Other(text) => format!("Outcome: \"{}\"", escape_html(text.trim())),
    };

    let mut out = format!(
        "✅ Ticket <b>#{}</b> ({}) has been closed.\n{}",
        ticket.id,
        escape_html(&ticket.subject),
        outcome
    );
    if let Some(note) = ticket.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        out.push_str(&format!("\nNote: {}", escape_html(note)));
    }
    out.push_str("\n\nSend /start if you need help with something else.");
    out
}
