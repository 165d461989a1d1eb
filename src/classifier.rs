use crate::models::{Action, Classification, Urgency};
use crate::providers::{LanguageModel, ResponseShape};
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Classifier {
    model: Arc<dyn LanguageModel>,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Never fails: transport and parse problems produce
    /// [`Classification::fallback`].
    pub async fn classify(&self, body: &str, context: Option<&[String]>) -> Classification {
        let prompt = build_prompt(body, context);
        let raw = match self.model.complete(&prompt, ResponseShape::Json).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error in AI analysis: {:#}", e);
                return Classification::fallback();
            }
        };

        match parse_classification(&raw) {
            Ok(classification) => {
                debug!(?classification, "Classified email");
                classification
            }
            Err(e) => {
                warn!("Malformed AI analysis: {:#}", e);
                Classification::fallback()
            }
        }
    }
}

pub fn build_prompt(body: &str, context: Option<&[String]>) -> String {
    let mut prompt = String::from(
        "Analyze this email and provide:\n\
         1. Summary (1-2 sentences)\n\
         2. Intent (what the sender wants)\n\
         3. Urgency (low/medium/high)\n\
         4. Suggested actions (reply, schedule, notify, forward, etc.)\n\n",
    );
    prompt.push_str("Email Content:\n");
    prompt.push_str(body);
    prompt.push_str("\n\n");

    if let Some(context) = context.filter(|c| !c.is_empty()) {
        prompt.push_str("Thread Context (most recent first):\n");
        for (i, previous) in context.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, previous));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Respond in JSON format with keys: summary, intent, urgency, actions. \
         \"actions\" must be a list of strings.",
    );
    prompt
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_classification(raw: &str) -> Result<Classification> {
    let value: Value =
        serde_json::from_str(strip_code_fence(raw)).context("response is not valid JSON")?;
    let Value::Object(map) = value else {
        bail!("response is not a JSON object");
    };

    let text_field = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

    let urgency = match map.get("urgency").and_then(Value::as_str) {
        Some(raw_urgency) => Urgency::parse(raw_urgency).unwrap_or_else(|| {
            warn!("Unrecognised urgency {:?}, treating as low", raw_urgency);
            Urgency::Low
        }),
        None => Urgency::Low,
    };

    let mut actions: Vec<Action> = Vec::new();
    let mut push = |raw_action: &str| {
        if raw_action.trim().is_empty() {
            return;
        }
        let action = Action::from(raw_action);
        if !actions.contains(&action) {
            actions.push(action);
        }
    };
    match map.get("actions") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).for_each(&mut push),
        Some(Value::String(single)) => push(single.as_str()),
        _ => {}
    }

    Ok(Classification {
        summary: text_field("summary").unwrap_or_default(),
        intent: text_field("intent").unwrap_or_else(|| "unknown".to_string()),
        urgency,
        actions,
    })
}
