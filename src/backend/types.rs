//! Wire types shared with the chatbot backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Classification of the contact behind a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Student,
    Lead,
    /// Known only from conversation memory, not registered anywhere
    Memory,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Summary of one end-user conversation as reported by the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_message: String,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_count: u64,
    /// End user has messaged recently
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
    /// A human operator is currently engaged
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_chat_support: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contact_type: ContactType,
}

impl Conversation {
    /// Name shown to the operator; falls back to the phone number
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.phone_number,
        }
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    #[serde(alias = "end_user", alias = "customer")]
    User,
    #[serde(alias = "assistant")]
    Bot,
    #[serde(alias = "admin")]
    Operator,
    #[serde(other)]
    Unknown,
}

impl SenderRole {
    pub fn label(self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Bot => "bot",
            SenderRole::Operator => "operator",
            SenderRole::Unknown => "?",
        }
    }
}

/// One entry of a conversation's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque, only unique within its conversation
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone_number: String,
    #[serde(alias = "message", default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "role")]
    pub sender: SenderRole,
    #[serde(default = "default_message_type", deserialize_with = "message_type_or_text")]
    pub message_type: String,
}

impl Message {
    /// Menus and button lists carry layout that plain rendering would mangle
    pub fn is_structured(&self) -> bool {
        matches!(
            self.message_type.as_str(),
            "menu" | "list" | "buttons" | "interactive"
        )
    }
}

fn default_message_type() -> String {
    "text".to_string()
}

fn message_type_or_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|kind| !kind.trim().is_empty())
        .unwrap_or_else(default_message_type))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Signed(id) => id.to_string(),
        RawId::Unsigned(id) => id.to_string(),
    })
}

/// Response envelope used by every backend endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success") || self.status.eq_ignore_ascii_case("ok")
    }
}

/// Body of a chat-support start/send/end request
#[derive(Debug, Serialize)]
pub(crate) struct SessionRequest<'a> {
    pub phone_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
}
