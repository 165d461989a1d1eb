use crate::classifier::Classifier;
use crate::db::{Database, StoreOutcome};
use crate::dispatch::{self, ActionKind, DispatchOutcome, Dispatchers};
use crate::models::{Classification, MessageDetails, MessageRecord, MessageStub, SenderIdentity};
use crate::providers::Mailbox;
use crate::responder::Responder;
use crate::sync::PollState;
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_results: u32,
    pub thread_context_limit: u32,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub identity: SenderIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    /// Shutdown was requested before the batch was exhausted.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The mailbox could not be listed; nothing was stored this cycle.
    FetchFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Details,
    Parsing,
    Storing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub schedule: Option<DispatchOutcome>,
    pub reply: Option<DispatchOutcome>,
    pub notify: Option<DispatchOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Processed {
        classification: Classification,
        dispatch: DispatchReport,
    },
    Failed {
        stage: Stage,
        reason: String,
    },
}

/// The polling worker. Owns the record store and explicit handles to every
/// provider; one cycle runs to completion before the next begins.
pub struct Assistant {
    mailbox: Arc<dyn Mailbox>,
    db: Database,
    classifier: Classifier,
    responder: Responder,
    dispatchers: Dispatchers,
    settings: LoopSettings,
}

impl Assistant {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        db: Database,
        classifier: Classifier,
        responder: Responder,
        dispatchers: Dispatchers,
        settings: LoopSettings,
    ) -> Self {
        Self {
            mailbox,
            db,
            classifier,
            responder,
            dispatchers,
            settings,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Polls until `shutdown` flips to `true` (or its sender goes away),
    /// then closes the database.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, state: &mut PollState) {
        info!("Email assistant started. Press Ctrl+C to stop.");
        loop {
            let outcome = self.run_cycle(&shutdown).await;
            state.record(outcome);

            if *shutdown.borrow() {
                break;
            }

            let delay = state.next_delay(self.settings.poll_interval, self.settings.error_backoff);
            debug!(?delay, "Sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            cycles = state.cycles,
            processed = state.messages_processed,
            failed = state.messages_failed,
            "Email assistant stopped."
        );
        self.db.close().await;
    }

    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleOutcome {
        info!("Checking for new emails...");
        let stubs = match self.mailbox.list_unread(self.settings.max_results).await {
            Ok(stubs) => stubs,
            Err(e) => {
                error!("Error fetching emails: {:#}", e);
                return CycleOutcome::FetchFailed(format!("{:#}", e));
            }
        };

        let mut report = CycleReport {
            fetched: stubs.len(),
            processed: 0,
            failed: 0,
            interrupted: false,
        };

        if stubs.is_empty() {
            info!("No new emails found.");
            return CycleOutcome::Completed(report);
        }
        info!("Found {} unread emails", stubs.len());

        for stub in &stubs {
            if *shutdown.borrow() {
                info!("Shutdown requested, leaving the rest of the batch");
                report.interrupted = true;
                break;
            }
            match self.process_message(stub).await {
                MessageOutcome::Processed { .. } => report.processed += 1,
                MessageOutcome::Failed { stage, reason } => {
                    warn!(message_id = %stub.id, ?stage, "Skipping email: {}", reason);
                    report.failed += 1;
                }
            }
        }

        CycleOutcome::Completed(report)
    }

    pub async fn process_message(&self, stub: &MessageStub) -> MessageOutcome {
        let details = match self.mailbox.get_details(&stub.id).await {
            Ok(details) => details,
            Err(e) => {
                return MessageOutcome::Failed {
                    stage: Stage::Details,
                    reason: format!("{:#}", e),
                };
            }
        };

        let record = match parse_message(&details, Utc::now()) {
            Ok(record) => record,
            Err(e) => {
                return MessageOutcome::Failed {
                    stage: Stage::Parsing,
                    reason: e.to_string(),
                };
            }
        };

        if let StoreOutcome::Failed(reason) = self.db.upsert_message(&record).await {
            return MessageOutcome::Failed {
                stage: Stage::Storing,
                reason,
            };
        }
        if !details.attachments.is_empty() {
            if let Err(e) = self.db.upsert_attachments(&details.attachments).await {
                warn!(message_id = %record.id, "Failed to store attachment metadata: {:#}", e);
            }
        }

        let context = self
            .db
            .recent_thread(&record.thread_id, self.settings.thread_context_limit)
            .await;
        let context = (!context.is_empty()).then_some(context.as_slice());

        let classification = self.classifier.classify(&record.body, context).await;
        info!(
            message_id = %record.id,
            sender = %record.sender,
            subject = %record.subject,
            urgency = %classification.urgency,
            summary = %classification.summary,
            "Processing email"
        );

        let dispatch = self.dispatch(&record, &classification).await;
        MessageOutcome::Processed {
            classification,
            dispatch,
        }
    }

    async fn dispatch(&self, record: &MessageRecord, classification: &Classification) -> DispatchReport {
        let mut report = DispatchReport {
            schedule: None,
            reply: None,
            notify: None,
        };

        for kind in dispatch::plan(classification) {
            match kind {
                ActionKind::Schedule => {
                    report.schedule = Some(self.dispatchers.schedule_meeting_for(record).await);
                }
                ActionKind::Reply => {
                    report.reply = Some(self.reply_to(record, classification).await);
                }
                ActionKind::Notify => {
                    report.notify = Some(self.dispatchers.notify_about(record, classification).await);
                }
            }
        }

        report
    }

    async fn reply_to(&self, record: &MessageRecord, classification: &Classification) -> DispatchOutcome {
        info!(message_id = %record.id, "Generating reply...");
        match self
            .responder
            .draft_reply(classification, record, &self.settings.identity)
            .await
        {
            Some(draft) => {
                self.dispatchers
                    .send_reply(&record.sender, &record.subject, &draft)
                    .await
            }
            None => {
                info!(message_id = %record.id, "No reply generated by AI");
                DispatchOutcome::Skipped
            }
        }
    }
}

/// Turns provider details into the canonical record. `observed_at` is the
/// time of observation, not the provider's timestamp.
pub fn parse_message(details: &MessageDetails, observed_at: DateTime<Utc>) -> Result<MessageRecord> {
    if details.id.trim().is_empty() {
        bail!("message has no id");
    }
    if details.thread_id.trim().is_empty() {
        bail!("message {} has no thread id", details.id);
    }

    let header = |name: &str| details.header(name).unwrap_or_default().to_string();

    Ok(MessageRecord {
        id: details.id.clone(),
        thread_id: details.thread_id.clone(),
        sender: header("From"),
        recipients: header("To"),
        subject: header("Subject"),
        body: details.body_excerpt.clone(),
        observed_at,
        is_read: !details.is_unread(),
        has_attachment: details.has_attachment,
        labels: (!details.label_ids.is_empty()).then(|| details.label_ids.join(",")),
    })
}
