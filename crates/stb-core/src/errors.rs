use crate::domain::TicketId;

/// Core error type for the support bot.
///
/// Adapter crates (SQLite, Telegram) map their specific errors into this type so the
/// conversation engine can tell store failures (retryable) from invariant conflicts
/// (a normal flow branch) and bad input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("client already has an active ticket #{0}")]
    ActiveTicketExists(TicketId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn ticket_not_found(id: TicketId) -> Self {
        Error::NotFound {
            what: "ticket",
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
