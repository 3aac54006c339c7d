use std::collections::VecDeque;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{Destination, JobId, JobRecord, OwnerId};

/// Snapshot of a job waiting in memory for a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedJob {
    pub id: JobId,
    pub owner: OwnerId,
    pub source: String,
    pub format: String,
    pub caption: String,
}

impl QueuedJob {
    pub fn destination(&self) -> Destination {
        Destination::owner(self.owner)
    }
}

impl From<&JobRecord> for QueuedJob {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id,
            owner: record.owner,
            source: record.source.clone(),
            format: record.format.clone(),
            caption: record.caption().to_string(),
        }
    }
}

/// FIFO of jobs not yet picked up by a worker
///
/// Doubles as the work queue: workers pop from the front and jobs
/// refused by the per-owner gate go back on at the tail.
#[derive(Default)]
pub(crate) struct PendingList {
    items: Mutex<VecDeque<QueuedJob>>,
    available: Notify,
}

impl PendingList {
    /// Append and return the 1-based position
    pub fn push_back(&self, job: QueuedJob) -> usize {
        let position = {
            let mut items = self.items.lock();
            items.push_back(job);
            items.len()
        };
        self.available.notify_one();
        position
    }

    pub fn pop_front(&self) -> Option<QueuedJob> {
        self.items.lock().pop_front()
    }

    /// Wait until a job is available and take it
    pub async fn next(&self) -> QueuedJob {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.pop_front() {
                return job;
            }
            notified.await;
        }
    }

    /// 1-based position of `id`, or 0 once it has left the list
    pub fn position(&self, id: JobId) -> usize {
        self.items
            .lock()
            .iter()
            .position(|job| job.id == id)
            .map_or(0, |idx| idx + 1)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.items.lock().iter().any(|job| job.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn count_for(&self, owner: OwnerId) -> usize {
        self.items.lock().iter().filter(|job| job.owner == owner).count()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.items.lock().iter().map(|job| job.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(id: i64, owner: i64) -> QueuedJob {
        QueuedJob {
            id: JobId(id),
            owner: OwnerId(owner),
            source: format!("https://example.com/{}", id),
            format: "best".to_string(),
            caption: String::new(),
        }
    }

    #[test]
    fn test_positions_track_removal() {
        let list = PendingList::default();
        assert_eq!(list.push_back(job(1, 1)), 1);
        assert_eq!(list.push_back(job(2, 1)), 2);
        assert_eq!(list.push_back(job(3, 2)), 3);

        assert_eq!(list.pop_front().map(|j| j.id), Some(JobId(1)));
        assert_eq!(list.position(JobId(3)), 2);
        assert_eq!(list.position(JobId(1)), 0);
        assert_eq!(list.count_for(OwnerId(1)), 1);
        assert!(list.contains(JobId(2)));
        assert!(!list.contains(JobId(1)));
    }

    #[tokio::test]
    async fn test_next_wakes_on_push() {
        let list = Arc::new(PendingList::default());
        let waiter = tokio::spawn({
            let list = list.clone();
            async move { list.next().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        list.push_back(job(9, 1));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(got.id, JobId(9));
        assert_eq!(list.len(), 0);
    }
}
