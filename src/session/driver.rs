//! Session driver.
//!
//! Owns the [`SessionMachine`] on a background task and serializes everything
//! that touches it: user commands and routed engine events share one queue
//! and are applied one at a time in arrival order. Every applied change is
//! published as a new [`SessionSnapshot`] on a watch channel and, when a
//! runtime is attached, as a [`RuntimeEvent::SessionUpdated`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::engine::CaptureMode;
use crate::error::{Result, VerifierError};
use crate::router::{EventSink, RoutedEvent};
use crate::runtime::{RuntimeEvent, VerifierRuntime};

use super::machine::SessionMachine;
use super::state::{SessionSnapshot, SessionState};

type Reply = oneshot::Sender<Result<()>>;

/// Work item for the driver task
#[derive(Debug)]
pub enum SessionTask {
    Initialize { license: String, reply: Reply },
    StartCapture {
        mode: CaptureMode,
        images: Vec<String>,
        reply: Reply,
    },
    CancelChipRead { reply: Reply },
    RetryChipRead { reply: Reply },
    SelectScenario { name: String, reply: Reply },
    SetChipOptIn { enabled: bool, reply: Reply },
    /// A decoded engine event
    Event(RoutedEvent),
    /// Stop the driver
    Shutdown,
}

pub struct SessionDriver;

impl SessionDriver {
    /// Move `machine` onto a background task and return a handle to it.
    pub fn spawn(
        machine: SessionMachine,
        runtime: Option<Arc<dyn VerifierRuntime>>,
    ) -> SessionHandle {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        tokio::spawn(async move {
            run_driver(machine, task_rx, snapshot_tx, runtime).await;
        });

        SessionHandle {
            task_tx,
            snapshot_rx,
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    task_tx: mpsc::UnboundedSender<SessionTask>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn initialize(&self, license: impl Into<String>) -> Result<()> {
        let license = license.into();
        self.request(|reply| SessionTask::Initialize { license, reply })
            .await
    }

    pub async fn start_capture(&self, mode: CaptureMode, images: Vec<String>) -> Result<()> {
        self.request(|reply| SessionTask::StartCapture {
            mode,
            images,
            reply,
        })
        .await
    }

    pub async fn cancel_chip_read(&self) -> Result<()> {
        self.request(|reply| SessionTask::CancelChipRead { reply })
            .await
    }

    pub async fn retry_chip_read(&self) -> Result<()> {
        self.request(|reply| SessionTask::RetryChipRead { reply })
            .await
    }

    pub async fn select_scenario(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| SessionTask::SelectScenario { name, reply })
            .await
    }

    pub async fn set_chip_opt_in(&self, enabled: bool) -> Result<()> {
        self.request(|reply| SessionTask::SetChipOptIn { enabled, reply })
            .await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = self.subscribe();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed()
                .await
                .map_err(|_| VerifierError::DriverClosed)?;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.task_tx.send(SessionTask::Shutdown);
    }

    async fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(Reply) -> SessionTask,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.task_tx
            .send(build(reply_tx))
            .map_err(|_| VerifierError::DriverClosed)?;
        reply_rx.await.map_err(|_| VerifierError::DriverClosed)?
    }
}

impl EventSink for SessionHandle {
    fn deliver(&self, event: RoutedEvent) {
        if self.task_tx.send(SessionTask::Event(event)).is_err() {
            tracing::debug!("Session driver stopped, dropping engine event");
        }
    }
}

/// Main driver loop
async fn run_driver(
    mut machine: SessionMachine,
    mut task_rx: mpsc::UnboundedReceiver<SessionTask>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    runtime: Option<Arc<dyn VerifierRuntime>>,
) {
    tracing::info!("Session driver started");

    let mut publisher = Publisher {
        snapshot_tx,
        runtime,
        published: machine.revision(),
    };

    while let Some(task) = task_rx.recv().await {
        let reply = match task {
            SessionTask::Initialize { license, reply } => {
                let result = match machine.begin_initialize() {
                    Ok(()) => {
                        publisher.publish(&machine);
                        machine.complete_initialize(&license).await
                    }
                    Err(e) => Err(e),
                };
                Some((reply, result))
            }
            SessionTask::StartCapture {
                mode,
                images,
                reply,
            } => Some((reply, machine.start_capture(mode, images))),
            SessionTask::CancelChipRead { reply } => Some((reply, machine.cancel_chip_read())),
            SessionTask::RetryChipRead { reply } => Some((reply, machine.retry_chip_read())),
            SessionTask::SelectScenario { name, reply } => {
                Some((reply, machine.select_scenario(&name)))
            }
            SessionTask::SetChipOptIn { enabled, reply } => {
                Some((reply, machine.set_chip_opt_in(enabled)))
            }
            SessionTask::Event(RoutedEvent::Completion(event)) => {
                machine.on_completion(event);
                None
            }
            SessionTask::Event(RoutedEvent::ChipProgress(event)) => {
                machine.on_chip_progress(event);
                None
            }
            SessionTask::Shutdown => {
                tracing::info!("Session driver shutting down");
                break;
            }
        };

        // Publish first so callers observe the new state once their reply arrives
        publisher.publish(&machine);
        if let Some((reply, result)) = reply {
            let _ = reply.send(result);
        }
    }

    if let Some(runtime) = &publisher.runtime {
        if let Err(e) = runtime.shutdown().await {
            tracing::warn!("Runtime shutdown failed: {}", e);
        }
    }

    tracing::info!("Session driver stopped");
}

struct Publisher {
    snapshot_tx: watch::Sender<SessionSnapshot>,
    runtime: Option<Arc<dyn VerifierRuntime>>,
    published: u64,
}

impl Publisher {
    /// Publish when the machine has changed since the last publish.
    fn publish(&mut self, machine: &SessionMachine) {
        if machine.revision() == self.published {
            return;
        }
        self.published = machine.revision();

        let snapshot = machine.snapshot();
        if let Some(runtime) = &self.runtime {
            let event = RuntimeEvent::SessionUpdated(Box::new(SessionState::clone(&snapshot)));
            if let Err(e) = runtime.emit(event) {
                tracing::debug!("Failed to emit session update: {}", e);
            }
        }
        self.snapshot_tx.send_replace(snapshot);
    }
}
