use crate::models::{Classification, MessageRecord, SenderIdentity};
use crate::providers::{LanguageModel, ResponseShape};
use std::sync::Arc;
use tracing::warn;

pub struct Responder {
    model: Arc<dyn LanguageModel>,
}

impl Responder {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// `None` means "do not reply". Callers must not retry.
    pub async fn draft_reply(
        &self,
        classification: &Classification,
        original: &MessageRecord,
        identity: &SenderIdentity,
    ) -> Option<String> {
        let prompt = build_prompt(classification, original, identity);
        match self.model.complete(&prompt, ResponseShape::Text).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!(message_id = %original.id, "Error generating reply: {:#}", e);
                None
            }
        }
    }
}

pub fn build_prompt(
    classification: &Classification,
    original: &MessageRecord,
    identity: &SenderIdentity,
) -> String {
    let analysis = serde_json::to_string_pretty(classification).unwrap_or_default();
    format!(
        "Compose a professional email reply based on this analysis:\n\n\
         Analysis:\n{analysis}\n\n\
         Original Email:\n\
         From: {from}\n\
         Subject: {subject}\n\
         Content: {body}\n\n\
         Your Information:\n\
         Name: {name}\n\
         Position: {position}\n\
         Company: {company}\n\n\
         The reply should be concise (3-5 sentences max) and address all key points. \
         Return only the body of the reply.",
        from = original.sender,
        subject = original.subject,
        body = original.body,
        name = identity.name,
        position = identity.position,
        company = identity.company,
    )
}
