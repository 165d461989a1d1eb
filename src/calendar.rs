use crate::auth::{AccessTokenSource, CALENDAR_SCOPE};
use crate::error::ProviderError;
use crate::providers::{Calendar, NewEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    html_link: Option<String>,
}

pub struct CalendarClient {
    client: Client,
    api_base: String,
    calendar_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl CalendarClient {
    pub fn new(api_base: &str, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            calendar_id: "primary".to_string(),
            tokens,
        })
    }
}

fn event_body(event: &NewEvent) -> serde_json::Value {
    let attendees: Vec<serde_json::Value> = event
        .attendees
        .iter()
        .map(|email| serde_json::json!({ "email": email }))
        .collect();

    serde_json::json!({
        "summary": event.summary,
        "start": {
            "dateTime": event.start.to_rfc3339(),
            "timeZone": "UTC",
        },
        "end": {
            "dateTime": event.end.to_rfc3339(),
            "timeZone": "UTC",
        },
        "attendees": attendees,
    })
}

#[async_trait]
impl Calendar for CalendarClient {
    async fn create_event(&self, event: &NewEvent) -> Result<String> {
        let token = self.tokens.access_token(&[CALENDAR_SCOPE]).await?;
        let url = format!("{}/calendars/{}/events", self.api_base, self.calendar_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&event_body(event))
            .send()
            .await
            .context("Calendar request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: "Google Calendar",
                status,
                body,
            }
            .into());
        }

        let inserted: InsertedEvent = response
            .json()
            .await
            .context("Failed to parse calendar response")?;

        inserted.html_link.ok_or_else(|| {
            ProviderError::Empty {
                provider: "Google Calendar",
            }
            .into()
        })
    }
}
