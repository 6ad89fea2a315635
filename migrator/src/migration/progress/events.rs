//! Migration progress events and event handling

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::migration::types::{JobStatus, Stage};

/// Events that can occur while jobs move through the queue and pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvent {
    JobQueued {
        job_key: String,
    },
    JobStarted {
        job_key: String,
    },
    StageBegun {
        job_key: String,
        stage: Stage,
    },
    StageCompleted {
        job_key: String,
        stage: Stage,
        duration_ms: u64,
        imported: usize,
        failed: usize,
    },
    StageFailed {
        job_key: String,
        stage: Stage,
        error: String,
    },
    ItemFailed {
        job_key: String,
        stage: Stage,
        item_id: String,
        error: String,
    },
    JobFinished {
        job_key: String,
        status: JobStatus,
    },
}

/// Event handler for migration events
pub trait MigrationEventHandler: Send + 'static {
    fn handle_event(&self, event: MigrationEvent);
}

/// Simple logging event handler
pub struct LoggingEventHandler;

impl MigrationEventHandler for LoggingEventHandler {
    fn handle_event(&self, event: MigrationEvent) {
        match event {
            MigrationEvent::JobQueued { job_key } => {
                debug!("[Event] Job queued: {}", job_key);
            }
            MigrationEvent::JobStarted { job_key } => {
                info!("[Event] Job started: {}", job_key);
            }
            MigrationEvent::StageBegun { job_key, stage } => {
                info!("[Event] Stage begun: {} ({})", stage, job_key);
            }
            MigrationEvent::StageCompleted {
                job_key,
                stage,
                duration_ms,
                imported,
                failed,
            } => {
                info!(
                    "[Event] Stage completed: {} ({}) in {}ms, {} imported, {} failed",
                    stage, job_key, duration_ms, imported, failed
                );
            }
            MigrationEvent::StageFailed {
                job_key,
                stage,
                error,
            } => {
                error!("[Event] Stage failed: {} ({}) - {}", stage, job_key, error);
            }
            MigrationEvent::ItemFailed {
                job_key,
                stage,
                item_id,
                error,
            } => {
                warn!(
                    "[Event] Item failed: {} {} ({}) - {}",
                    stage, item_id, job_key, error
                );
            }
            MigrationEvent::JobFinished { job_key, status } => match status {
                JobStatus::Finished => info!("[Event] Job finished: {}", job_key),
                other => warn!("[Event] Job finished: {} ({})", job_key, other.as_str()),
            },
        }
    }
}

/// Broadcast fan-out of migration events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MigrationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: MigrationEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.sender.subscribe()
    }

    /// Forward every event to `handler` on a background task
    pub fn attach<H: MigrationEventHandler>(&self, handler: H) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler.handle_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("[Event] Handler lagged, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Wait until `job_key` reports `JobFinished`; `None` if the bus closes first
pub async fn wait_for_finish(
    receiver: &mut broadcast::Receiver<MigrationEvent>,
    job_key: &str,
) -> Option<JobStatus> {
    loop {
        match receiver.recv().await {
            Ok(MigrationEvent::JobFinished {
                job_key: finished,
                status,
            }) if finished == job_key => return Some(status),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
