// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Init Dispatch Queue
//!
//! Bounded mpsc queue feeding a fixed pool of workers that run the app-side
//! `/init` handshake. Dispatch never blocks: a full or closed queue is
//! reported to the caller at once. Each job carries a cancellation token the
//! caller keeps through an [`InitHandle`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::exapp::AppId;

#[derive(Debug, Clone)]
pub struct InitJob {
    pub app_id: AppId,
    pub is_update: bool,
    /// Distinguishes this dispatch from later ones for the same app.
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Caller-side handle of a dispatched init job.
#[derive(Debug, Clone)]
pub struct InitHandle {
    app_id: AppId,
    cancel: CancellationToken,
}

impl InitHandle {
    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the job is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("init queue is full, {0} was not dispatched")]
    QueueFull(AppId),

    #[error("init workers are shut down, {0} was not dispatched")]
    Closed(AppId),
}

#[derive(Clone)]
pub struct InitQueue {
    sender: mpsc::Sender<InitJob>,
}

pub struct InitReceiver {
    receiver: mpsc::Receiver<InitJob>,
}

impl InitQueue {
    pub fn channel(capacity: usize) -> (Self, InitReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, InitReceiver { receiver })
    }

    pub fn dispatch(&self, job: InitJob) -> Result<InitHandle, DispatchError> {
        let handle = InitHandle { app_id: job.app_id.clone(), cancel: job.cancel.clone() };
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => DispatchError::QueueFull(job.app_id),
            mpsc::error::TrySendError::Closed(job) => DispatchError::Closed(job.app_id),
        })?;
        Ok(handle)
    }
}

/// Work performed for one dequeued job.
#[async_trait]
pub trait InitJobRunner: Send + Sync {
    async fn run_init_job(&self, job: InitJob);
}

pub struct InitWorkerPool;

impl InitWorkerPool {
    /// Spawn `workers` tasks draining `receiver` until it closes or `shutdown` fires.
    pub fn start(
        receiver: InitReceiver,
        runner: Arc<dyn InitJobRunner>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let receiver = Arc::new(Mutex::new(receiver.receiver));
        info!(workers, "Starting init worker pool");
        (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let runner = runner.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        let job = tokio::select! {
                            job = async { receiver.lock().await.recv().await } => job,
                            _ = shutdown.cancelled() => break,
                        };
                        let Some(job) = job else { break };
                        if job.cancel.is_cancelled() {
                            debug!(worker, app_id = %job.app_id, "Skipping cancelled init job");
                            continue;
                        }
                        debug!(worker, app_id = %job.app_id, "Running init job");
                        runner.run_init_job(job).await;
                    }
                    debug!(worker, "Init worker stopped");
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<AppId>>,
    }

    #[async_trait]
    impl InitJobRunner for Recorder {
        async fn run_init_job(&self, job: InitJob) {
            self.seen.lock().await.push(job.app_id);
        }
    }

    fn job(id: &str) -> InitJob {
        InitJob { app_id: AppId::new(id), is_update: false, generation: 0, cancel: CancellationToken::new() }
    }

    #[tokio::test]
    async fn test_full_queue_is_reported_synchronously() {
        let (queue, _receiver) = InitQueue::channel(1);
        queue.dispatch(job("a")).unwrap();
        assert_eq!(queue.dispatch(job("b")).unwrap_err(), DispatchError::QueueFull(AppId::new("b")));
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (queue, receiver) = InitQueue::channel(1);
        drop(receiver);
        assert_eq!(queue.dispatch(job("a")).unwrap_err(), DispatchError::Closed(AppId::new("a")));
    }

    #[tokio::test]
    async fn test_workers_run_jobs_and_skip_cancelled() {
        let (queue, receiver) = InitQueue::channel(8);
        let recorder = Arc::new(Recorder { seen: Mutex::new(Vec::new()) });
        let shutdown = CancellationToken::new();
        let handles = InitWorkerPool::start(receiver, recorder.clone(), 2, shutdown.clone());

        let skipped = queue.dispatch(job("skipped")).unwrap();
        skipped.cancel();
        queue.dispatch(job("a")).unwrap();
        queue.dispatch(job("b")).unwrap();

        for _ in 0..50 {
            if recorder.seen.lock().await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        for h in handles {
            h.await.unwrap();
        }
        let mut seen = recorder.seen.lock().await.clone();
        seen.sort();
        assert_eq!(seen, vec![AppId::new("a"), AppId::new("b")]);
    }
}
