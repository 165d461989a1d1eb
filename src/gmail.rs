use crate::auth::GoogleAuthenticator;
use crate::models::{AttachmentRecord, MessageDetails, MessageStub};
use crate::providers::Mailbox;
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::{Message, MessagePart};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use std::collections::HashMap;
use tracing::debug;

#[derive(Clone)]
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailClient {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>) -> Self {
        Self { hub }
    }

    pub fn connect(auth: GoogleAuthenticator) -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native roots")?
            .https_only()
            .enable_http1()
            .build();
        let hub = Gmail::new(hyper::Client::builder().build(connector), auth);
        Ok(Self::new(hub))
    }

    pub async fn list_messages(&self, label_ids: &[&str], max_results: u32) -> Result<Vec<String>> {
        let mut req = self
            .hub
            .users()
            .messages_list("me")
            .max_results(max_results);

        for label_id in label_ids {
            req = req.add_label_ids(label_id);
        }

        let (_, message_list) = req.doit().await.context("Failed to list messages")?;

        let ids = message_list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok(ids)
    }

    pub async fn get_message(&self, id: &str) -> Result<MessageDetails> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .doit()
            .await
            .context(format!("Failed to get message {}", id))?;

        Ok(details_from_message(msg))
    }

    pub async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let raw_message = format!(
            "From: me\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            to, subject, body
        );

        debug!(to, subject, body_len = body.len(), "Sending message");

        use std::io::Cursor;
        let cursor = Cursor::new(raw_message.into_bytes());

        self.hub
            .users()
            .messages_send(Message::default(), "me")
            .upload(
                cursor,
                "message/rfc822"
                    .parse()
                    .context("Invalid upload content type")?,
            )
            .await
            .context("Failed to send message")?;

        Ok(())
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MessageStub>> {
        let ids = self.list_messages(&["INBOX", "UNREAD"], max_results).await?;
        Ok(ids.into_iter().map(MessageStub::new).collect())
    }

    async fn get_details(&self, id: &str) -> Result<MessageDetails> {
        self.get_message(id).await
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.send_message(to, subject, body).await
    }
}

fn details_from_message(msg: Message) -> MessageDetails {
    let id = msg.id.unwrap_or_default();
    let mut headers = HashMap::new();
    let mut has_attachment = false;
    let mut attachments = Vec::new();

    if let Some(payload) = &msg.payload {
        if let Some(part_headers) = &payload.headers {
            for header in part_headers {
                if let (Some(name), Some(value)) = (&header.name, &header.value) {
                    headers.insert(name.clone(), value.clone());
                }
            }
        }
        has_attachment = payload.parts.is_some();
        collect_attachments(payload, &id, &mut attachments);
    }

    MessageDetails {
        thread_id: msg.thread_id.unwrap_or_default(),
        headers,
        body_excerpt: msg.snippet.unwrap_or_default(),
        has_attachment,
        label_ids: msg.label_ids.unwrap_or_default(),
        attachments,
        id,
    }
}

fn collect_attachments(part: &MessagePart, email_id: &str, out: &mut Vec<AttachmentRecord>) {
    if let Some(filename) = part.filename.as_deref().filter(|f| !f.is_empty()) {
        let body = part.body.as_ref();
        // `attachmentId` changes between fetches; the part id does not.
        let id = part
            .part_id
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| filename.to_string());
        out.push(AttachmentRecord {
            id,
            email_id: email_id.to_string(),
            filename: filename.to_string(),
            mime_type: part.mime_type.clone().unwrap_or_default(),
            size: body.and_then(|b| b.size).map(i64::from).unwrap_or(0),
        });
    }

    if let Some(parts) = &part.parts {
        for p in parts {
            collect_attachments(p, email_id, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePartBody, MessagePartHeader};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn plain_message_maps_headers_and_snippet() {
        let msg = Message {
            id: Some("m1".to_string()),
            thread_id: Some("t1".to_string()),
            snippet: Some("Can we meet?".to_string()),
            label_ids: Some(vec!["INBOX".to_string(), "UNREAD".to_string()]),
            payload: Some(MessagePart {
                headers: Some(vec![header("From", "a@x.com"), header("Subject", "Hi")]),
                mime_type: Some("text/plain".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let details = details_from_message(msg);
        assert_eq!(details.id, "m1");
        assert_eq!(details.thread_id, "t1");
        assert_eq!(details.header("From"), Some("a@x.com"));
        assert_eq!(details.header("Subject"), Some("Hi"));
        assert_eq!(details.body_excerpt, "Can we meet?");
        assert!(details.is_unread());
        assert!(!details.has_attachment);
        assert!(details.attachments.is_empty());
    }

    fn message_with_attachment(attachment_id: &str) -> Message {
        Message {
            id: Some("m1".to_string()),
            thread_id: Some("t1".to_string()),
            label_ids: Some(vec!["UNREAD".to_string()]),
            payload: Some(MessagePart {
                mime_type: Some("multipart/mixed".to_string()),
                parts: Some(vec![MessagePart {
                    part_id: Some("1".to_string()),
                    filename: Some("report.xlsx".to_string()),
                    mime_type: Some("application/vnd.ms-excel".to_string()),
                    body: Some(MessagePartBody {
                        attachment_id: Some(attachment_id.to_string()),
                        size: Some(2048),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn refetched_attachment_is_stored_once() {
        use crate::db::Database;
        use crate::processor::parse_message;
        use chrono::Utc;

        let db = Database::in_memory().await.unwrap();
        for token in ["ANGjdJ_first", "ANGjdJ_second", "ANGjdJ_third"] {
            let details = details_from_message(message_with_attachment(token));
            let record = parse_message(&details, Utc::now()).unwrap();
            db.upsert_message(&record).await;
            db.upsert_attachments(&details.attachments).await.unwrap();
        }

        let stored = db.get_attachments("m1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "1");
        assert_eq!(stored[0].filename, "report.xlsx");
    }

    #[test]
    fn nested_parts_with_filenames_become_attachments() {
        let attachment_part = MessagePart {
            part_id: Some("1.1".to_string()),
            filename: Some("agenda.pdf".to_string()),
            mime_type: Some("application/pdf".to_string()),
            body: Some(MessagePartBody {
                attachment_id: Some("ANGjdJ".to_string()),
                size: Some(4096),
                ..Default::default()
            }),
            ..Default::default()
        };
        let msg = Message {
            id: Some("m2".to_string()),
            payload: Some(MessagePart {
                mime_type: Some("multipart/mixed".to_string()),
                parts: Some(vec![
                    MessagePart {
                        part_id: Some("0".to_string()),
                        filename: Some(String::new()),
                        mime_type: Some("text/plain".to_string()),
                        ..Default::default()
                    },
                    MessagePart {
                        part_id: Some("1".to_string()),
                        mime_type: Some("multipart/related".to_string()),
                        parts: Some(vec![attachment_part]),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let details = details_from_message(msg);
        assert!(details.has_attachment);
        assert!(!details.is_unread());
        assert_eq!(
            details.attachments,
            vec![AttachmentRecord {
                id: "1.1".to_string(),
                email_id: "m2".to_string(),
                filename: "agenda.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                size: 4096,
            }]
        );
    }
}
