use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::models::{JobStatus, QueueItem, SegmentPayload};
use crate::services::image_service::Illustrator;

const FINISHED_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct IllustrationJob {
    pub id: String,
    pub video_id: String,
    pub segments: Vec<SegmentPayload>,
}

/// Illustration jobs waiting for (or handled by) the background worker,
/// with their status kept around so clients can poll for completion.
pub struct IllustrationQueue {
    items: Mutex<VecDeque<QueueItem>>,
    sender: UnboundedSender<IllustrationJob>,
    counter: AtomicU64,
}

impl IllustrationQueue {
    pub fn new() -> (Self, UnboundedReceiver<IllustrationJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = IllustrationQueue {
            items: Mutex::new(VecDeque::new()),
            sender,
            counter: AtomicU64::new(0),
        };
        (queue, receiver)
    }

    pub fn enqueue(&self, video_id: &str, segments: Vec<SegmentPayload>) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let item_id = format!("{}_{}_{}", chrono::Utc::now().timestamp(), video_id, seq);
        let item = QueueItem {
            id: item_id.clone(),
            video_id: video_id.to_string(),
            status: JobStatus::Pending,
            segment_count: segments.len(),
            added_at: chrono::Utc::now().to_rfc3339(),
            processed_at: None,
            error_message: None,
        };

        if let Ok(mut items) = self.items.lock() {
            items.push_back(item);
        }

        let job = IllustrationJob {
            id: item_id.clone(),
            video_id: video_id.to_string(),
            segments,
        };
        if self.sender.send(job).is_err() {
            error!("Illustration worker is gone; job {item_id} will not run");
            self.mark_failed(&item_id, "Illustration worker is not running".to_string());
        }
        item_id
    }

    /// Flip a pending job to processing. Returns false when the job was
    /// removed before the worker got to it.
    pub fn mark_processing(&self, item_id: &str) -> bool {
        self.update(item_id, |item| {
            item.status = JobStatus::Processing;
        })
    }

    pub fn mark_completed(&self, item_id: &str) {
        self.update(item_id, |item| {
            item.status = JobStatus::Completed;
            item.processed_at = Some(chrono::Utc::now().to_rfc3339());
        });
        self.prune();
    }

    pub fn mark_failed(&self, item_id: &str, error_message: String) {
        self.update(item_id, |item| {
            item.status = JobStatus::Failed;
            item.processed_at = Some(chrono::Utc::now().to_rfc3339());
            item.error_message = Some(error_message);
        });
        self.prune();
    }

    pub fn get(&self, item_id: &str) -> Option<QueueItem> {
        let items = self.items.lock().ok()?;
        items.iter().find(|item| item.id == item_id).cloned()
    }

    pub fn get_all_items(&self) -> Vec<QueueItem> {
        if let Ok(items) = self.items.lock() {
            items.iter().cloned().collect()
        } else {
            Vec::new()
        }
    }

    pub fn remove_item(&self, item_id: &str) -> bool {
        if let Ok(mut items) = self.items.lock() {
            if let Some(pos) = items.iter().position(|item| item.id == item_id) {
                items.remove(pos);
                return true;
            }
        }
        false
    }

    fn update(&self, item_id: &str, apply: impl FnOnce(&mut QueueItem)) -> bool {
        if let Ok(mut items) = self.items.lock() {
            if let Some(item) = items.iter_mut().find(|item| item.id == item_id) {
                apply(item);
                return true;
            }
        }
        false
    }

    fn prune(&self) {
        if let Ok(mut items) = self.items.lock() {
            let mut finished = items.iter().filter(|i| i.status.is_finished()).count();
            while finished > FINISHED_HISTORY {
                match items.iter().position(|i| i.status.is_finished()) {
                    Some(pos) => {
                        items.remove(pos);
                        finished -= 1;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Drain jobs one at a time. The worker only holds a weak handle on the
/// queue, so it stops once the owning state is dropped.
pub async fn run_illustration_worker(
    queue: Weak<IllustrationQueue>,
    mut jobs: UnboundedReceiver<IllustrationJob>,
    illustrator: Arc<Illustrator>,
) {
    info!("Illustration worker started.");
    while let Some(job) = jobs.recv().await {
        let Some(queue) = queue.upgrade() else {
            break;
        };
        if !queue.mark_processing(&job.id) {
            warn!("Skipping removed illustration job {}", job.id);
            continue;
        }
        info!(
            "Illustrating {} segments for video {}",
            job.segments.len(),
            job.video_id
        );

        match illustrator.illustrate(&job.video_id, job.segments).await {
            Ok(segments) => {
                let illustrated = segments.iter().filter(|s| s.image.is_some()).count();
                info!(
                    "Illustration job {} finished: {illustrated}/{} images",
                    job.id,
                    segments.len()
                );
                queue.mark_completed(&job.id);
            }
            Err(e) => {
                error!("Illustration job {} failed: {e}", job.id);
                queue.mark_failed(&job.id, e.to_string());
            }
        }
    }
    info!("Illustration worker stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageServiceConfig;
    use crate::models::StartMarker;
    use crate::services::store::Store;
    use base64::Engine;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(start: &str, keyword: &str) -> SegmentPayload {
        SegmentPayload {
            start: Some(StartMarker::from(start)),
            keyword: Some(keyword.to_string()),
            ..Default::default()
        }
    }

    async fn wait_until_finished(queue: &IllustrationQueue, id: &str) -> QueueItem {
        for _ in 0..200 {
            if let Some(item) = queue.get(id) {
                if item.status.is_finished() {
                    return item;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never finished");
    }

    #[test]
    fn enqueue_tracks_pending_job() {
        let (queue, mut jobs) = IllustrationQueue::new();
        let id = queue.enqueue("abc123", vec![payload("00:04", "intro")]);

        let item = queue.get(&id).unwrap();
        assert_eq!(item.status, JobStatus::Pending);
        assert_eq!(item.segment_count, 1);
        assert_eq!(queue.get_all_items().len(), 1);
        assert_eq!(jobs.try_recv().unwrap().id, id);
    }

    #[test]
    fn status_transitions_are_recorded() {
        let (queue, _jobs) = IllustrationQueue::new();
        let ok = queue.enqueue("abc123", vec![]);
        let bad = queue.enqueue("abc123", vec![]);

        assert!(queue.mark_processing(&ok));
        assert_eq!(queue.get(&ok).unwrap().status, JobStatus::Processing);
        queue.mark_completed(&ok);
        queue.mark_failed(&bad, "boom".to_string());

        let ok = queue.get(&ok).unwrap();
        assert_eq!(ok.status, JobStatus::Completed);
        assert!(ok.processed_at.is_some());
        let bad = queue.get(&bad).unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn removed_jobs_are_not_started() {
        let (queue, _jobs) = IllustrationQueue::new();
        let id = queue.enqueue("abc123", vec![]);

        assert!(queue.remove_item(&id));
        assert!(!queue.remove_item(&id));
        assert!(!queue.mark_processing(&id));
    }

    #[test]
    fn finished_history_is_bounded() {
        let (queue, _jobs) = IllustrationQueue::new();
        let pending = queue.enqueue("keep", vec![]);
        for _ in 0..(FINISHED_HISTORY + 5) {
            let id = queue.enqueue("abc123", vec![]);
            queue.mark_completed(&id);
        }

        assert_eq!(queue.get_all_items().len(), FINISHED_HISTORY + 1);
        assert_eq!(queue.get(&pending).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn closed_worker_fails_job_immediately() {
        let (queue, jobs) = IllustrationQueue::new();
        drop(jobs);

        let id = queue.enqueue("abc123", vec![]);
        assert_eq!(queue.get(&id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn worker_illustrates_and_completes_jobs() {
        let server = MockServer::start().await;
        let png = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        Mock::given(method("POST"))
            .and(path("/sdapi/v1/txt2img"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": [png]})))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let illustrator = Arc::new(
            Illustrator::new(
                &ImageServiceConfig {
                    base_url: server.uri(),
                    steps: 20,
                },
                dir.path().to_path_buf(),
                store.clone(),
            )
            .unwrap(),
        );
        let (queue, jobs) = IllustrationQueue::new();
        let queue = Arc::new(queue);
        let worker = tokio::spawn(run_illustration_worker(
            Arc::downgrade(&queue),
            jobs,
            illustrator,
        ));

        let id = queue.enqueue("abc123", vec![payload("00:04", "intro")]);
        let item = wait_until_finished(&queue, &id).await;

        assert_eq!(item.status, JobStatus::Completed);
        let stored = store.segments("abc123").unwrap();
        assert_eq!(stored[0].image_path.as_deref(), Some("abc123_0004.png"));
        assert!(dir.path().join("abc123_0004.png").exists());

        drop(queue);
        worker.await.unwrap();
    }
}
