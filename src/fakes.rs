//! Recording in-memory collaborators for unit tests. Every call is recorded
//! before the configured failure (if any) is returned, so tests can count
//! attempts as well as successes.

use crate::models::{MessageDetails, MessageStub};
use crate::providers::{Calendar, ChatNotifier, LanguageModel, Mailbox, NewEvent, ResponseShape};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Default)]
pub struct FakeMailbox {
    stubs: Vec<MessageStub>,
    details: HashMap<String, MessageDetails>,
    list_error: Option<String>,
    fail_send: bool,
    shutdown_on: Option<(String, watch::Sender<bool>)>,
    sent: Mutex<Vec<(String, String, String)>>,
    list_calls: Mutex<u32>,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<MessageDetails>) -> Self {
        let stubs = messages.iter().map(|m| MessageStub::new(&m.id)).collect();
        let details = messages.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self {
            stubs,
            details,
            ..Self::default()
        }
    }

    pub fn failing_list(reason: &str) -> Self {
        Self {
            list_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_send() -> Self {
        Self {
            fail_send: true,
            ..Self::default()
        }
    }

    /// Lists a stub whose details lookup will fail.
    pub fn with_missing(mut self, id: &str) -> Self {
        self.stubs.insert(0, MessageStub::new(id));
        self
    }

    pub fn with_failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Requests shutdown while the details of `id` are being fetched.
    pub fn shutdown_during(mut self, id: &str, sender: watch::Sender<bool>) -> Self {
        self.shutdown_on = Some((id.to_string(), sender));
        self
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MessageStub>> {
        *self.list_calls.lock().unwrap() += 1;
        if let Some(reason) = &self.list_error {
            return Err(anyhow!(reason.clone()));
        }
        Ok(self
            .stubs
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect())
    }

    async fn get_details(&self, id: &str) -> Result<MessageDetails> {
        if let Some((trigger, sender)) = &self.shutdown_on {
            if trigger == id {
                let _ = sender.send(true);
            }
        }
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("message {} not found", id))
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        if self.fail_send {
            return Err(anyhow!("smtp relay refused"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    fail: bool,
    events: Mutex<Vec<NewEvent>>,
}

impl FakeCalendar {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<NewEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Calendar for FakeCalendar {
    async fn create_event(&self, event: &NewEvent) -> Result<String> {
        let mut events = self.events.lock().unwrap();
        events.push(event.clone());
        if self.fail {
            return Err(anyhow!("calendar unavailable"));
        }
        Ok(format!("https://calendar.example/event/{}", events.len()))
    }
}

#[derive(Default)]
pub struct FakeChat {
    fail: bool,
    messages: Mutex<Vec<String>>,
}

impl FakeChat {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatNotifier for FakeChat {
    async fn post_message(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(anyhow!("slack unavailable"));
        }
        Ok(())
    }
}

/// Answers classification prompts with `analysis` and drafting prompts
/// with `reply`; `None` simulates a provider error.
pub struct ScriptedModel {
    analysis: Option<String>,
    reply: Option<String>,
    prompts: Mutex<Vec<(ResponseShape, String)>>,
}

impl ScriptedModel {
    pub fn new(analysis: Option<&str>, reply: Option<&str>) -> Self {
        Self {
            analysis: analysis.map(str::to_string),
            reply: reply.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self, shape: ResponseShape) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == shape)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, shape: ResponseShape) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((shape, prompt.to_string()));
        let answer = match shape {
            ResponseShape::Json => &self.analysis,
            ResponseShape::Text => &self.reply,
        };
        answer.clone().ok_or_else(|| anyhow!("model unavailable"))
    }
}
