use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One observed message as persisted in the `emails` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub recipients: String,
    pub subject: String,
    pub body: String,
    pub observed_at: DateTime<Utc>,
    pub is_read: bool,
    pub has_attachment: bool,
    pub labels: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttachmentRecord {
    pub id: String,
    pub email_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
}

/// What `listUnread` hands back: just enough to fetch the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStub {
    pub id: String,
}

impl MessageStub {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Provider-side view of a message before it is parsed into a record.
#[derive(Debug, Clone, Default)]
pub struct MessageDetails {
    pub id: String,
    pub thread_id: String,
    pub headers: HashMap<String, String>,
    pub body_excerpt: String,
    pub has_attachment: bool,
    pub label_ids: Vec<String>,
    pub attachments: Vec<AttachmentRecord>,
}

impl MessageDetails {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_unread(&self) -> bool {
        self.label_ids.iter().any(|l| l == "UNREAD")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            _ => None,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Low => write!(f, "low"),
            Urgency::Medium => write!(f, "medium"),
            Urgency::High => write!(f, "high"),
        }
    }
}

/// Suggested follow-up. The vocabulary is open: anything the model
/// proposes beyond the three handled kinds is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Reply,
    Schedule,
    Notify,
    Other(String),
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "reply" => Action::Reply,
            "schedule" => Action::Schedule,
            "notify" => Action::Notify,
            _ => Action::Other(normalized),
        }
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Action::from(value.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Reply => "reply".to_string(),
            Action::Schedule => "schedule".to_string(),
            Action::Notify => "notify".to_string(),
            Action::Other(s) => s,
        }
    }
}

/// Structured output of the classifier for one message. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub summary: String,
    pub intent: String,
    pub urgency: Urgency,
    pub actions: Vec<Action>,
}

impl Classification {
    /// Substituted whenever the classifier cannot produce a real answer.
    pub fn fallback() -> Self {
        Self {
            summary: "Error analyzing email".to_string(),
            intent: "unknown".to_string(),
            urgency: Urgency::Low,
            actions: Vec::new(),
        }
    }

    pub fn has_action(&self, action: &Action) -> bool {
        self.actions.contains(action)
    }
}

/// Display fields of the mailbox owner, used when drafting replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderIdentity {
    pub name: String,
    pub position: String,
    pub company: String,
}

impl Default for SenderIdentity {
    fn default() -> Self {
        Self {
            name: "Your Name".to_string(),
            position: "Your Position".to_string(),
            company: "Your Company".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_normalize_case_and_keep_unknown_entries() {
        assert_eq!(Action::from(" Reply "), Action::Reply);
        assert_eq!(Action::from("SCHEDULE"), Action::Schedule);
        assert_eq!(Action::from("Forward"), Action::Other("forward".to_string()));
    }

    #[test]
    fn classification_serializes_actions_as_plain_strings() {
        let c = Classification {
            summary: "s".to_string(),
            intent: "i".to_string(),
            urgency: Urgency::High,
            actions: vec![Action::Reply, Action::Other("archive".to_string())],
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["urgency"], "high");
        assert_eq!(json["actions"], serde_json::json!(["reply", "archive"]));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut details = MessageDetails::default();
        details
            .headers
            .insert("SUBJECT".to_string(), "Hello".to_string());
        assert_eq!(details.header("Subject"), Some("Hello"));
        assert_eq!(details.header("From"), None);
    }
}
