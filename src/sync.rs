use crate::processor::CycleOutcome;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct PollState {
    pub cycles: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    /// Reset by the first cycle whose fetch succeeds.
    pub consecutive_fetch_failures: u32,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
}

impl PollState {
    pub fn record(&mut self, outcome: CycleOutcome) {
        self.cycles += 1;
        self.last_cycle_at = Some(Utc::now());
        match &outcome {
            CycleOutcome::Completed(report) => {
                self.consecutive_fetch_failures = 0;
                self.messages_processed += report.processed as u64;
                self.messages_failed += report.failed as u64;
            }
            CycleOutcome::FetchFailed(_) => {
                self.consecutive_fetch_failures += 1;
            }
        }
        self.last_outcome = Some(outcome);
    }

    /// The normal tick after a completed cycle, the longer backoff after a
    /// cycle that could not reach the mailbox.
    pub fn next_delay(&self, interval: Duration, backoff: Duration) -> Duration {
        match self.last_outcome {
            Some(CycleOutcome::FetchFailed(_)) => backoff,
            _ => interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::CycleReport;

    const INTERVAL: Duration = Duration::from_secs(300);
    const BACKOFF: Duration = Duration::from_secs(600);

    #[test]
    fn fetch_failure_escalates_until_next_success() {
        let mut state = PollState::default();
        assert_eq!(state.next_delay(INTERVAL, BACKOFF), INTERVAL);

        state.record(CycleOutcome::FetchFailed("timeout".to_string()));
        state.record(CycleOutcome::FetchFailed("timeout".to_string()));
        assert_eq!(state.consecutive_fetch_failures, 2);
        assert_eq!(state.next_delay(INTERVAL, BACKOFF), BACKOFF);

        state.record(CycleOutcome::Completed(CycleReport {
            fetched: 3,
            processed: 2,
            failed: 1,
            interrupted: false,
        }));
        assert_eq!(state.consecutive_fetch_failures, 0);
        assert_eq!(state.next_delay(INTERVAL, BACKOFF), INTERVAL);
        assert_eq!(state.cycles, 3);
        assert_eq!(state.messages_processed, 2);
        assert_eq!(state.messages_failed, 1);
        assert!(state.last_cycle_at.is_some());
    }
}
