use crate::config::MeetingSettings;
use crate::models::{Action, Classification, MessageRecord, Urgency};
use crate::providers::{Calendar, ChatNotifier, Mailbox, NewEvent};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// Side effects a classification can ask for, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Schedule,
    Reply,
    Notify,
}

/// The three checks are independent; a message may trigger all of them.
pub fn plan(classification: &Classification) -> Vec<ActionKind> {
    let mut planned = Vec::new();
    if classification.has_action(&Action::Schedule) {
        planned.push(ActionKind::Schedule);
    }
    if classification.has_action(&Action::Reply) {
        planned.push(ActionKind::Reply);
    }
    if classification.urgency == Urgency::High || classification.has_action(&Action::Notify) {
        planned.push(ActionKind::Notify);
    }
    planned
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Scheduled { link: String },
    Notified,
    /// Nothing was attempted, e.g. no reply was drafted.
    Skipped,
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DispatchOutcome::Failed(_))
    }
}

pub struct Dispatchers {
    mailbox: Arc<dyn Mailbox>,
    calendar: Arc<dyn Calendar>,
    chat: Arc<dyn ChatNotifier>,
    meetings: MeetingSettings,
}

impl Dispatchers {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        calendar: Arc<dyn Calendar>,
        chat: Arc<dyn ChatNotifier>,
        meetings: MeetingSettings,
    ) -> Self {
        Self {
            mailbox,
            calendar,
            chat,
            meetings,
        }
    }

    pub async fn send_reply(&self, to: &str, subject: &str, body: &str) -> DispatchOutcome {
        let subject = reply_subject(subject);
        match self.mailbox.send(to, &subject, body).await {
            Ok(()) => {
                info!("Reply sent to: {}", to);
                DispatchOutcome::Sent
            }
            Err(e) => {
                error!("Error sending reply: {:#}", e);
                DispatchOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    pub async fn schedule_event(
        &self,
        summary: &str,
        start: DateTime<Utc>,
        duration: Duration,
        attendees: &[String],
    ) -> DispatchOutcome {
        let Some(end) = start.checked_add_signed(duration) else {
            error!("Error scheduling meeting: end time out of range");
            return DispatchOutcome::Failed("meeting end time out of range".to_string());
        };
        let event = NewEvent {
            summary: summary.to_string(),
            start,
            end,
            attendees: attendees.to_vec(),
        };
        match self.calendar.create_event(&event).await {
            Ok(link) => {
                info!("Calendar event created: {}", link);
                DispatchOutcome::Scheduled { link }
            }
            Err(e) => {
                error!("Error scheduling meeting: {:#}", e);
                DispatchOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    pub async fn notify(&self, text: &str) -> DispatchOutcome {
        match self.chat.post_message(text).await {
            Ok(()) => DispatchOutcome::Notified,
            Err(e) => {
                error!("Slack notification failed: {:#}", e);
                DispatchOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    /// No temporal expressions are read from the message: meetings are
    /// always proposed at a fixed offset from now.
    pub async fn schedule_meeting_for(&self, record: &MessageRecord) -> DispatchOutcome {
        info!("Scheduling meeting...");
        let offset = Duration::try_hours(self.meetings.start_offset_hours);
        let duration = Duration::try_hours(self.meetings.duration_hours);
        let (Some(start), Some(duration)) =
            (offset.and_then(|o| Utc::now().checked_add_signed(o)), duration)
        else {
            error!("Error scheduling meeting: configured meeting hours out of range");
            return DispatchOutcome::Failed("meeting time out of range".to_string());
        };
        let attendees = extract_address(&record.sender)
            .map(|a| vec![a.to_string()])
            .unwrap_or_default();
        self.schedule_event(
            &format!("Meeting: {}", record.subject),
            start,
            duration,
            &attendees,
        )
        .await
    }

    pub async fn notify_about(
        &self,
        record: &MessageRecord,
        classification: &Classification,
    ) -> DispatchOutcome {
        self.notify(&notification_text(record, classification)).await
    }
}

pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"))
    {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

pub fn notification_text(record: &MessageRecord, classification: &Classification) -> String {
    let summary = if classification.summary.is_empty() {
        "No summary"
    } else {
        classification.summary.as_str()
    };
    format!(
        "Important email from {}\nSubject: {}\nSummary: {}",
        record.sender, record.subject, summary
    )
}

/// `"Name <a@x.com>"` -> `a@x.com`; a bare address is returned as is.
pub fn extract_address(header: &str) -> Option<&str> {
    let header = header.trim();
    let address = match (header.rfind('<'), header.rfind('>')) {
        (Some(start), Some(end)) if start < end => header[start + 1..end].trim(),
        _ => header,
    };
    if address.contains('@') { Some(address) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCalendar, FakeChat, FakeMailbox};

    fn classification(urgency: Urgency, actions: &[&str]) -> Classification {
        Classification {
            summary: "summary".to_string(),
            intent: "intent".to_string(),
            urgency,
            actions: actions.iter().map(|a| Action::from(*a)).collect(),
        }
    }

    #[test]
    fn plan_routes_each_check_independently() {
        assert!(plan(&classification(Urgency::Low, &[])).is_empty());
        assert_eq!(
            plan(&classification(Urgency::High, &[])),
            vec![ActionKind::Notify]
        );
        assert_eq!(
            plan(&classification(Urgency::Low, &["notify", "reply", "schedule"])),
            vec![ActionKind::Schedule, ActionKind::Reply, ActionKind::Notify]
        );
        assert_eq!(
            plan(&classification(Urgency::High, &["notify"])),
            vec![ActionKind::Notify]
        );
        assert!(plan(&classification(Urgency::Medium, &["forward"])).is_empty());
    }

    #[test]
    fn reply_subject_is_not_doubled() {
        assert_eq!(reply_subject("Hi"), "Re: Hi");
        assert_eq!(reply_subject("RE: Hi"), "RE: Hi");
        assert_eq!(reply_subject(""), "Re: ");
        assert_eq!(reply_subject("Événement"), "Re: Événement");
    }

    #[test]
    fn addresses_are_pulled_out_of_display_names() {
        assert_eq!(extract_address("Bob <bob@x.com>"), Some("bob@x.com"));
        assert_eq!(extract_address(" a@x.com "), Some("a@x.com"));
        assert_eq!(extract_address("undisclosed-recipients"), None);
    }

    #[tokio::test]
    async fn schedule_event_spans_requested_duration() {
        let calendar = Arc::new(FakeCalendar::default());
        let dispatchers = Dispatchers::new(
            Arc::new(FakeMailbox::default()),
            calendar.clone(),
            Arc::new(FakeChat::default()),
            MeetingSettings::default(),
        );

        let start = Utc::now();
        let outcome = dispatchers
            .schedule_event("Sync", start, Duration::hours(2), &["a@x.com".to_string()])
            .await;
        assert!(matches!(outcome, DispatchOutcome::Scheduled { .. }));

        let events = calendar.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end - events[0].start, Duration::hours(2));
        assert_eq!(events[0].attendees, vec!["a@x.com".to_string()]);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let dispatchers = Dispatchers::new(
            Arc::new(FakeMailbox::failing_send()),
            Arc::new(FakeCalendar::failing()),
            Arc::new(FakeChat::failing()),
            MeetingSettings::default(),
        );

        assert!(dispatchers.send_reply("a@x.com", "Hi", "body").await.is_failure());
        assert!(dispatchers.notify("text").await.is_failure());
        assert!(
            dispatchers
                .schedule_event("s", Utc::now(), Duration::hours(1), &[])
                .await
                .is_failure()
        );
    }

    #[tokio::test]
    async fn out_of_range_meeting_hours_fail_without_calling_calendar() {
        let calendar = Arc::new(FakeCalendar::default());
        let dispatchers = Dispatchers::new(
            Arc::new(FakeMailbox::default()),
            calendar.clone(),
            Arc::new(FakeChat::default()),
            MeetingSettings {
                start_offset_hours: i64::MAX,
                duration_hours: 1,
            },
        );
        let record = MessageRecord {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            sender: "a@x.com".to_string(),
            recipients: String::new(),
            subject: "Hi".to_string(),
            body: "Can we meet?".to_string(),
            observed_at: Utc::now(),
            is_read: false,
            has_attachment: false,
            labels: None,
        };

        assert!(dispatchers.schedule_meeting_for(&record).await.is_failure());
        assert!(
            dispatchers
                .schedule_event("s", DateTime::<Utc>::MAX_UTC, Duration::hours(1), &[])
                .await
                .is_failure()
        );
        assert!(calendar.events().is_empty());
    }

    #[tokio::test]
    async fn send_reply_prefixes_subject() {
        let mailbox = Arc::new(FakeMailbox::default());
        let dispatchers = Dispatchers::new(
            mailbox.clone(),
            Arc::new(FakeCalendar::default()),
            Arc::new(FakeChat::default()),
            MeetingSettings::default(),
        );

        let outcome = dispatchers.send_reply("a@x.com", "Hi", "Sure!").await;
        assert_eq!(outcome, DispatchOutcome::Sent);
        let sent = mailbox.sent();
        assert_eq!(
            sent,
            vec![(
                "a@x.com".to_string(),
                "Re: Hi".to_string(),
                "Sure!".to_string()
            )]
        );
    }
}
