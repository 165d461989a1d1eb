use crate::error::ProviderError;
use crate::providers::ChatNotifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

pub struct SlackNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    channel: String,
}

impl SlackNotifier {
    pub fn new(api_base: &str, bot_token: &str, channel: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            channel: channel.to_string(),
        })
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.api_base, method);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Slack request to {} failed", method))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: "Slack",
                status,
                body,
            }
            .into());
        }

        let api_response: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Slack response")?;

        if api_response.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let message = api_response
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(ProviderError::Api {
                provider: "Slack",
                message,
            }
            .into());
        }

        Ok(api_response)
    }

    /// Verifies the bot token. Returns the workspace name.
    pub async fn auth_test(&self) -> Result<String> {
        let response = self.call("auth.test", serde_json::json!({})).await?;
        let team = response
            .get("team")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        info!("Slack connection successful to team: {}", team);
        Ok(team)
    }
}

#[async_trait]
impl ChatNotifier for SlackNotifier {
    async fn post_message(&self, text: &str) -> Result<()> {
        debug!(channel = %self.channel, "Posting Slack notification");
        self.call(
            "chat.postMessage",
            serde_json::json!({
                "channel": self.channel,
                "text": text,
            }),
        )
        .await?;
        Ok(())
    }
}
