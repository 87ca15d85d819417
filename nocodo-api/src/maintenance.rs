use chrono::Utc;
use nocodo_interaction::QuestionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Periodically expire overdue questions and purge settled ones past retention
pub fn spawn_sweeper(store: Arc<QuestionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = store.sweep(Utc::now());
            if report.is_empty() {
                debug!("Question sweep found nothing to do");
            } else {
                info!(
                    expired = report.expired.len(),
                    purged = report.purged.len(),
                    "Question sweep"
                );
            }
        }
    })
}
