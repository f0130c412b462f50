//! Background publication sweep
//!
//! A periodic task that promotes draft and pending posts to published once
//! they have sat in their current state longer than the configured
//! threshold. Edits reset the state-entry clock, so an edited post waits
//! the full threshold again.

use std::time::Duration;

use bson::{doc, DateTime};
use tracing::{debug, error, info};

use crate::db::schemas::PostDoc;
use crate::db::MongoCollection;
use crate::types::AgoraError;

/// Filter matching posts due for publication at `now`
pub fn due_filter(now: DateTime, threshold: Duration) -> bson::Document {
    let cutoff = DateTime::from_millis(now.timestamp_millis() - threshold.as_millis() as i64);
    doc! {
        "status": { "$in": ["0", "1"] },
        "status_entered_at": { "$lte": cutoff },
    }
}

/// Run a single sweep, returning how many posts were published
pub async fn sweep_once(
    posts: &MongoCollection<PostDoc>,
    threshold: Duration,
) -> Result<u64, AgoraError> {
    let now = DateTime::now();
    let update = doc! {
        "$set": {
            "status": "2",
            "status_entered_at": now,
            "metadata.updated_at": now,
        }
    };

    let result = posts.update_many(due_filter(now, threshold), update).await?;
    Ok(result.modified_count)
}

/// Spawn the periodic sweep task
pub fn spawn_sweep_task(
    posts: MongoCollection<PostDoc>,
    interval: Duration,
    threshold: Duration,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match sweep_once(&posts, threshold).await {
                Ok(0) => debug!("Publication sweep: nothing due"),
                Ok(count) => info!("Publication sweep: published {} posts", count),
                Err(e) => error!("Publication sweep failed: {}", e),
            }
        }
    });
    info!(
        "Publication sweep task started (interval {}s, threshold {}s)",
        interval.as_secs(),
        threshold.as_secs()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_filter_targets_private_statuses() {
        let filter = due_filter(DateTime::now(), Duration::from_secs(10800));
        let statuses = filter
            .get_document("status")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.contains(&bson::Bson::String("0".into())));
        assert!(statuses.contains(&bson::Bson::String("1".into())));
    }

    #[test]
    fn test_due_filter_cutoff_is_threshold_before_now() {
        let now = DateTime::from_millis(1_000_000_000);
        let filter = due_filter(now, Duration::from_secs(3600));
        let cutoff = filter
            .get_document("status_entered_at")
            .unwrap()
            .get_datetime("$lte")
            .unwrap();
        assert_eq!(cutoff.timestamp_millis(), 1_000_000_000 - 3_600_000);
    }
}
