use crate::domain::{ClientId, MessageKind};

/// Channel-agnostic inbound update.
///
/// Provider-specific fields stay in the adapter crate.
#[derive(Clone, Debug)]
pub struct InboundUpdate {
    pub client: ClientId,
    pub display_name: Option<String>,
    pub payload: Payload,
}

impl InboundUpdate {
    pub fn new(client: ClientId, payload: Payload) -> Self {
        Self {
            client,
            display_name: None,
            payload,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Command(Command),
    Text(String),
    Media(MediaInput),
    /// Stickers, voice notes, locations and the like.
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    Finish,
    Other(String),
}

impl Command {
    /// Parse `/name[@bot] args`. Returns `None` when `text` is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let first = text.split_whitespace().next().unwrap_or("");
        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        Some(match name.as_str() {
            "start" => Command::Start,
            "cancel" => Command::Cancel,
            "finish" | "done" => Command::Finish,
            _ => Command::Other(name),
        })
    }
}

/// Media attachment as delivered by the provider, before any download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaInput {
    pub kind: MessageKind,
    /// Opaque provider file handle.
    pub handle: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}

/// Reply keyboard shown under an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Keyboard {
    /// Rows of option buttons.
    Options(Vec<Vec<String>>),
    Remove,
}

impl Keyboard {
    pub fn single_row<S: Into<String>>(options: impl IntoIterator<Item = S>) -> Self {
        Keyboard::Options(vec![options.into_iter().map(Into::into).collect()])
    }

    pub fn one_per_row<S: Into<String>>(options: impl IntoIterator<Item = S>) -> Self {
        Keyboard::Options(options.into_iter().map(|o| vec![o.into()]).collect())
    }
}

/// One outbound message produced by the conversation engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Outcome of a best-effort push to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}
