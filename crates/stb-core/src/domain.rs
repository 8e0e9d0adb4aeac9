use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable provider-assigned identity of a client (a Telegram private chat id today).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ticket id (assigned by the store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticket message id (assigned by the store, monotonically increasing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// Bot credential id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BotId(pub i64);

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============== Ticket attributes ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    PaymentDispute,
    Dispute,
    GeneralQuestion,
    Employment,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::PaymentDispute,
        Category::Dispute,
        Category::GeneralQuestion,
        Category::Employment,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Category::PaymentDispute => "payment_dispute",
            Category::Dispute => "dispute",
            Category::GeneralQuestion => "general_question",
            Category::Employment => "employment",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Human subject line stored on the ticket.
    pub fn subject(self) -> &'static str {
        match self {
            Category::PaymentDispute => "Payment dispute",
            Category::Dispute => "Dispute",
            Category::GeneralQuestion => "General question",
            Category::Employment => "Employment",
        }
    }

    /// Label shown on the category menu button.
    pub fn menu_label(self) -> &'static str {
        match self {
            Category::PaymentDispute => "💳 Payment dispute",
            Category::Dispute => "⚖️ Dispute",
            Category::GeneralQuestion => "❓ General question",
            Category::Employment => "💼 Employment",
        }
    }

    /// Parse free-form menu input: the button label, the plain name, a short form or the
    /// menu number. Case-insensitive; leading emoji and punctuation are ignored.
    pub fn from_choice(input: &str) -> Option<Self> {
        let normalized = input
            .trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .trim()
            .to_lowercase()
            .replace(['-', '_'], " ");

        match normalized.as_str() {
            "1" | "payment dispute" | "payment" | "payment problem" | "crypto payment" => {
                Some(Category::PaymentDispute)
            }
            "2" | "dispute" | "order dispute" => Some(Category::Dispute),
            "3" | "general question" | "general" | "question" => Some(Category::GeneralQuestion),
            "4" | "employment" | "job" | "jobs" | "vacancy" => Some(Category::Employment),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

/// Ticket lifecycle status. `Archived` ends the conversation, not the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Active,
    Archived,
}

impl TicketStatus {
    pub fn code(self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Archived => "archived",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(TicketStatus::Active),
            "archived" => Some(TicketStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    InProgress,
    Refused,
    Refunded,
    Other(String),
}

impl Resolution {
    pub fn code(&self) -> &str {
        match self {
            Resolution::InProgress => "in_progress",
            Resolution::Refused => "refused",
            Resolution::Refunded => "refunded",
            Resolution::Other(text) => text,
        }
    }

    /// Anything that is not a known code is kept verbatim as terminal text.
    pub fn from_code(code: &str) -> Self {
        match code {
            "in_progress" => Resolution::InProgress,
            "refused" => Resolution::Refused,
            "refunded" => Resolution::Refunded,
            other => Resolution::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn code(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub subject: String,
    pub category: Category,
    pub description: Option<String>,
    pub client: ClientId,
    pub client_handle: Option<String>,
    pub status: TicketStatus,
    pub resolution: Resolution,
    pub note: Option<String>,
    pub priority: Priority,
    /// Staff member the ticket is assigned to (e.g. a courier).
    pub assigned_to: Option<i64>,
    /// Worker that opened the ticket; outbound traffic prefers the same bot.
    pub bot_id: Option<BotId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }
}

/// Fields for a ticket about to be created. New tickets are always ACTIVE / in progress.
#[derive(Clone, Debug)]
pub struct NewTicket {
    pub client: ClientId,
    pub client_handle: Option<String>,
    pub category: Category,
    pub subject: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub bot_id: Option<BotId>,
}

impl NewTicket {
    pub fn for_category(client: ClientId, client_handle: Option<String>, category: Category) -> Self {
        Self {
            client,
            client_handle,
            category,
            subject: category.subject().to_string(),
            description: Some(format!("Category: {}", category.subject())),
            priority: Priority::default(),
            bot_id: None,
        }
    }
}

/// Partial staff edit. `None` leaves the field untouched; `Some(None)` clears a nullable one.
#[derive(Clone, Debug, Default)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub resolution: Option<Resolution>,
    pub note: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<i64>>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.resolution.is_none()
            && self.note.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
    }
}

/// Result of `update_ticket`: the new row plus the status it had before the edit.
#[derive(Clone, Debug)]
pub struct UpdatedTicket {
    pub ticket: Ticket,
    pub previous_status: TicketStatus,
}

impl UpdatedTicket {
    pub fn was_archived_now(&self) -> bool {
        self.previous_status == TicketStatus::Active && self.ticket.status == TicketStatus::Archived
    }
}

#[derive(Clone, Debug, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub client: Option<ClientId>,
}

// ============== Messages ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Photo,
    Video,
    Document,
}

impl MessageKind {
    pub fn code(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Photo => "photo",
            MessageKind::Video => "video",
            MessageKind::Document => "document",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "text" => Some(MessageKind::Text),
            "photo" => Some(MessageKind::Photo),
            "video" => Some(MessageKind::Video),
            "document" => Some(MessageKind::Document),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaffRole {
    Admin,
    Operator,
    Courier,
}

impl StaffRole {
    pub fn code(self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Operator => "operator",
            StaffRole::Courier => "courier",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "admin" => Some(StaffRole::Admin),
            "operator" => Some(StaffRole::Operator),
            "courier" => Some(StaffRole::Courier),
            _ => None,
        }
    }

    /// Prefix shown to the client in front of staff replies.
    pub fn label(self) -> &'static str {
        match self {
            StaffRole::Admin => "Admin",
            StaffRole::Operator => "Operator",
            StaffRole::Courier => "Courier",
        }
    }
}

/// The staff member behind an outbound reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaffRef {
    pub role: StaffRole,
    pub staff_id: Option<i64>,
    pub display_name: Option<String>,
}

impl StaffRef {
    pub fn new(role: StaffRole) -> Self {
        Self {
            role,
            staff_id: None,
            display_name: None,
        }
    }

    /// Sender tag recorded on the message: `admin`, or `<role>:<id>`.
    pub fn sender_tag(&self) -> String {
        match self.staff_id {
            Some(id) => format!("{}:{id}", self.role.code()),
            None => self.role.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: MessageId,
    pub ticket_id: TicketId,
    /// Client id, `admin`, or a role-tagged staff id.
    pub sender: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub file_handle: Option<String>,
    /// Path relative to the media root; `None` when the attachment could not be stored.
    pub local_path: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<u64>,
    pub from_staff: bool,
    pub sender_name: Option<String>,
    pub sender_role: Option<StaffRole>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a message about to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub file_handle: Option<String>,
    pub local_path: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<u64>,
    pub from_staff: bool,
    pub sender_name: Option<String>,
    pub sender_role: Option<StaffRole>,
}

impl NewMessage {
    pub fn client_text(client: &ClientId, sender_name: Option<String>, text: &str) -> Self {
        Self {
            sender: client.0.clone(),
            kind: MessageKind::Text,
            content: Some(text.to_string()),
            file_handle: None,
            local_path: None,
            original_filename: None,
            file_size: None,
            from_staff: false,
            sender_name,
            sender_role: None,
        }
    }

    pub fn staff_text(staff: &StaffRef, text: &str) -> Self {
        Self {
            sender: staff.sender_tag(),
            kind: MessageKind::Text,
            content: Some(text.to_string()),
            file_handle: None,
            local_path: None,
            original_filename: None,
            file_size: None,
            from_staff: true,
            sender_name: staff.display_name.clone(),
            sender_role: Some(staff.role),
        }
    }
}

// ============== Clients and bots ==============

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub handle: Option<String>,
    pub blocked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotCredential {
    pub id: BotId,
    pub name: String,
    pub token: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_choice_accepts_labels_names_and_numbers() {
        for c in Category::ALL {
            assert_eq!(Category::from_choice(c.menu_label()), Some(c));
            assert_eq!(Category::from_choice(c.code()), Some(c));
        }
        assert_eq!(Category::from_choice("dispute"), Some(Category::Dispute));
        assert_eq!(Category::from_choice("  DISPUTE "), Some(Category::Dispute));
        assert_eq!(Category::from_choice("3"), Some(Category::GeneralQuestion));
        assert_eq!(Category::from_choice("payment-dispute"), Some(Category::PaymentDispute));
        assert_eq!(Category::from_choice("refund please"), None);
        assert_eq!(Category::from_choice(""), None);
    }

    #[test]
    fn resolution_keeps_unknown_codes_verbatim() {
        assert_eq!(Resolution::from_code("refunded"), Resolution::Refunded);
        let other = Resolution::from_code("replacement shipped");
        assert_eq!(other, Resolution::Other("replacement shipped".to_string()));
        assert_eq!(other.code(), "replacement shipped");
    }

    #[test]
    fn staff_sender_tag_includes_id_when_known() {
        assert_eq!(StaffRef::new(StaffRole::Admin).sender_tag(), "admin");
        let courier = StaffRef {
            role: StaffRole::Courier,
            staff_id: Some(7),
            display_name: None,
        };
        assert_eq!(courier.sender_tag(), "courier:7");
    }
}
