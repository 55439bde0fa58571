//! Shared state for background certificate jobs.
//!
//! - `JobsState` holds the status of every job and is injected into the
//!   actix application as `web::Data`.
//! - `JobUpdate` is what a running job sends to report a status change.
//! - `start_job_updater` is the single writer: it drains the update channel
//!   and records each status in the map.

use common::jobs::JobStatus;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Clonable handle on the job table.
#[derive(Clone)]
pub struct JobsState {
    /// Job id to latest known status. Read by `GET /api/jobs/{job_id}`.
    pub jobs: Arc<RwLock<HashMap<String, JobStatus>>>,

    /// Sender half of the update channel consumed by `start_job_updater`.
    pub tx: mpsc::Sender<JobUpdate>,
}

impl JobsState {
    /// Creates an empty job table and the receiver to hand to
    /// [`start_job_updater`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let state = Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tx,
        };
        (state, rx)
    }

    /// Records `status` directly, bypassing the channel. Used when a job is
    /// first registered so it is visible before the response is sent.
    pub async fn register(&self, job_id: &str, status: JobStatus) {
        self.jobs.write().await.insert(job_id.to_string(), status);
    }

    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }
}

#[derive(Debug)]
pub struct JobUpdate {
    pub(crate) job_id: String,
    pub(crate) status: JobStatus,
}

/// Applies every `JobUpdate` received on `rx`. Runs for the life of the
/// server, since `state` itself holds a sender.
///
/// At most `retained_finished` succeeded or failed jobs are kept; beyond that
/// the oldest finished status is dropped. Queued and running jobs are never
/// evicted.
pub async fn start_job_updater(
    state: JobsState,
    mut rx: mpsc::Receiver<JobUpdate>,
    retained_finished: usize,
) {
    let mut finished: VecDeque<String> = VecDeque::new();
    while let Some(update) = rx.recv().await {
        debug!("Job {} is now {:?}", update.job_id, update.status);
        let is_finished = update.status.is_finished();
        let mut jobs = state.jobs.write().await;
        jobs.insert(update.job_id.clone(), update.status);

        if is_finished {
            finished.push_back(update.job_id);
            while finished.len() > retained_finished {
                if let Some(evicted) = finished.pop_front() {
                    debug!("Forgetting finished job {}", evicted);
                    jobs.remove(&evicted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn updater_records_latest_status() {
        let (state, rx) = JobsState::new(4);
        tokio::spawn(start_job_updater(state.clone(), rx, 8));

        state.register("job-1", JobStatus::Queued).await;
        state
            .tx
            .send(JobUpdate {
                job_id: "job-1".to_string(),
                status: JobStatus::Running(50),
            })
            .await
            .unwrap();
        state
            .tx
            .send(JobUpdate {
                job_id: "job-1".to_string(),
                status: JobStatus::Failed("boom".to_string()),
            })
            .await
            .unwrap();

        let mut status = None;
        for _ in 0..100 {
            status = state.status("job-1").await;
            if status.as_ref().is_some_and(JobStatus::is_finished) {
                break;
            }
            actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(JobStatus::Failed("boom".to_string())));
    }

    #[actix_web::test]
    async fn oldest_finished_jobs_are_evicted() {
        let (state, rx) = JobsState::new(8);
        tokio::spawn(start_job_updater(state.clone(), rx, 2));

        state.register("running", JobStatus::Running(10)).await;
        for id in ["a", "b", "c"] {
            state
                .tx
                .send(JobUpdate {
                    job_id: id.to_string(),
                    status: JobStatus::Failed("x".to_string()),
                })
                .await
                .unwrap();
        }

        for _ in 0..100 {
            if state.status("c").await.is_some() {
                break;
            }
            actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state.status("a").await, None);
        assert!(state.status("b").await.is_some());
        assert!(state.status("c").await.is_some());
        assert_eq!(state.status("running").await, Some(JobStatus::Running(10)));
    }

    #[actix_web::test]
    async fn unknown_job_has_no_status() {
        let (state, _rx) = JobsState::new(1);
        assert_eq!(state.status("missing").await, None);
    }
}
