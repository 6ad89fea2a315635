//! Bounded job queue: one in-flight run per job key, `worker_count` jobs at a time

use futures_util::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::migration::orchestrator::MigrationJob;
use crate::migration::progress::{EventBus, MigrationEvent};
use crate::services::config::QueueConfig;
use crate::services::errors::{MigrationError, MigrationResult};

pub struct JobQueue {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    events: EventBus,
}

impl JobQueue {
    /// Spawn the dispatcher; must be called inside a tokio runtime
    pub fn start(job: Arc<MigrationJob>, config: &QueueConfig, events: EventBus) -> Self {
        let (sender, receiver) = mpsc::channel::<String>(config.capacity.max(1));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let worker_count = config.worker_count.max(1);

        let running = in_flight.clone();
        let finished = events.clone();
        let dispatcher = tokio::spawn(async move {
            let keys = stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|key| (key, receiver))
            });

            keys.for_each_concurrent(worker_count, |job_key| {
                let job = job.clone();
                let running = running.clone();
                let finished = finished.clone();
                async move {
                    let status = job.execute(&job_key).await;
                    // released before the finish is announced so a listener can requeue
                    running.lock().await.remove(&job_key);
                    debug!("[JobQueue] Released {}", job_key);
                    finished.emit(MigrationEvent::JobFinished { job_key, status });
                }
            })
            .await;

            info!("[JobQueue] Dispatcher stopped");
        });

        info!("[JobQueue] Started with {} workers", worker_count);

        Self {
            sender: Mutex::new(Some(sender)),
            in_flight,
            dispatcher: Mutex::new(Some(dispatcher)),
            events,
        }
    }

    /// Queue a job; returns `false` if that key is already queued or running
    pub async fn enqueue(&self, job_key: &str) -> MigrationResult<bool> {
        let closed = || MigrationError::QueueClosed {
            job_key: job_key.to_string(),
        };

        let sender = self.sender.lock().await.clone().ok_or_else(closed)?;

        if !self.in_flight.lock().await.insert(job_key.to_string()) {
            warn!("[JobQueue] {} is already queued or running", job_key);
            return Ok(false);
        }

        if sender.send(job_key.to_string()).await.is_err() {
            self.in_flight.lock().await.remove(job_key);
            return Err(closed());
        }

        self.events.emit(MigrationEvent::JobQueued {
            job_key: job_key.to_string(),
        });
        Ok(true)
    }

    pub async fn is_in_flight(&self, job_key: &str) -> bool {
        self.in_flight.lock().await.contains(job_key)
    }

    /// Stop accepting jobs and wait for queued and running jobs to finish
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            if let Err(e) = dispatcher.await {
                warn!("[JobQueue] Dispatcher ended abnormally: {}", e);
            }
        }
    }
}
