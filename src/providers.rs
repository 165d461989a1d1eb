//! Narrow seams to the outside world. The processing loop only ever talks
//! to these traits; concrete clients live in `gmail`, `calendar`, `slack`
//! and `llm`.

use crate::models::{MessageDetails, MessageStub};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MessageStub>>;
    async fn get_details(&self, id: &str) -> Result<MessageDetails>;
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
}

#[async_trait]
pub trait Calendar: Send + Sync {
    /// Returns a link to the created event.
    async fn create_event(&self, event: &NewEvent) -> Result<String>;
}

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn post_message(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Ask the provider for a single JSON object.
    Json,
    Text,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, shape: ResponseShape) -> Result<String>;
}
