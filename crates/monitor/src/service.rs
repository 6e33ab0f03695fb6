//! Monitor Service - the single task that owns the session controller
//!
//! Commands and network events are taken one at a time from two channels, so
//! tracker state is never touched concurrently and a start cannot begin while
//! a previous detach is still in flight.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::debugger::TargetEvent;
use crate::error::{MonitorError, Result};
use crate::session::{SessionController, SessionStatus};

enum Command {
    Start {
        target_id: String,
        label: String,
        reply: oneshot::Sender<Result<SessionStatus>>,
    },
    Stop {
        reply: oneshot::Sender<SessionStatus>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Cloneable control surface for a running service
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

impl MonitorHandle {
    /// Start (or switch) monitoring. Errors when the attach is refused.
    pub async fn start(
        &self,
        target_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start {
            target_id: target_id.into(),
            label: label.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| MonitorError::ServiceClosed)?
    }

    pub async fn stop(&self) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| MonitorError::ServiceClosed)
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| MonitorError::ServiceClosed)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| MonitorError::ServiceClosed)
    }
}

/// Spawn the service loop. It runs until every [`MonitorHandle`] is dropped,
/// then stops any active session and returns the controller.
pub fn spawn(
    controller: SessionController,
    events: mpsc::UnboundedReceiver<TargetEvent>,
) -> (MonitorHandle, JoinHandle<SessionController>) {
    let (tx, rx) = mpsc::channel(32);
    let task = tokio::spawn(run(controller, rx, events));
    (MonitorHandle { tx }, task)
}

async fn run(
    mut controller: SessionController,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::UnboundedReceiver<TargetEvent>,
) -> SessionController {
    let mut events_open = true;

    loop {
        tokio::select! {
            // Control first, so a stop is not starved by an event burst
            biased;

            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!("[Monitor] All handles dropped, shutting down");
                    break;
                };
                handle_command(&mut controller, command).await;
            }

            event = events.recv(), if events_open => {
                match event {
                    Some(event) => {
                        controller.handle_event(event);
                    }
                    None => {
                        tracing::warn!("[Monitor] Event source closed");
                        events_open = false;
                    }
                }
            }
        }
    }

    controller.stop().await;
    controller
}

async fn handle_command(controller: &mut SessionController, command: Command) {
    match command {
        Command::Start {
            target_id,
            label,
            reply,
        } => {
            let result = controller.start(&target_id, &label).await;
            let _ = reply.send(result); // caller may have given up waiting
        }
        Command::Stop { reply } => {
            controller.stop().await;
            let _ = reply.send(controller.status());
        }
        Command::Status { reply } => {
            let _ = reply.send(controller.status());
        }
    }
}
