//! Monitoring Session Controller
//!
//! Attaches to one target at a time, owns the request tracker for that
//! attachment, and relays tracker output to the sink bus.
//!
//! `Inactive → Attaching → Active → Detaching → Inactive`. Every transition
//! takes `&mut self`, so two of them can never overlap.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::cdp::protocol::{SessionId, TargetId};
use crate::debugger::{Debugger, TargetEvent};
use crate::error::{MonitorError, Result};
use crate::events::{SinkBus, SinkMessage};
use crate::store::{MetadataStore, SessionMetadata};
use crate::tracker::{domain_of, RequestTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Inactive,
    Attaching,
    Active,
    Detaching,
}

/// The one attachment being monitored
#[derive(Debug, Clone)]
struct ActiveSession {
    id: Uuid,
    target_id: TargetId,
    cdp_session: SessionId,
    label: String,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub target_id: Option<TargetId>,
    pub label: Option<String>,
    pub monitored_origin: String,
    pub active_request_count: usize,
}

pub struct SessionController {
    debugger: Arc<dyn Debugger>,
    store: Arc<dyn MetadataStore>,
    bus: SinkBus,
    tracker: RequestTracker,
    state: SessionState,
    session: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(debugger: Arc<dyn Debugger>, store: Arc<dyn MetadataStore>, bus: SinkBus) -> Self {
        Self {
            debugger,
            store,
            bus,
            tracker: RequestTracker::new(),
            state: SessionState::Inactive,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn bus(&self) -> &SinkBus {
        &self.bus
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            session_id: self.session.as_ref().map(|s| s.id),
            target_id: self.session.as_ref().map(|s| s.target_id.clone()),
            label: self.session.as_ref().map(|s| s.label.clone()),
            monitored_origin: self.tracker.origin().to_string(),
            active_request_count: self.tracker.active_count(),
        }
    }

    /// Begin monitoring `target_id`, tearing down any current session first.
    ///
    /// On failure the controller is left `Inactive`; nothing is retried.
    pub async fn start(&mut self, target_id: &str, label: &str) -> Result<SessionStatus> {
        if self.state != SessionState::Inactive {
            tracing::info!("[Monitor] Restart requested, detaching current session first");
            self.stop().await;
        }

        let id = Uuid::now_v7();
        tracing::info!("[Monitor] Session {} attaching to {}", id, target_id);
        self.state = SessionState::Attaching;
        self.tracker.reset();

        let attached = match self.debugger.attach(target_id).await {
            Ok(attached) => attached,
            Err(source) => {
                tracing::error!("[Monitor] Attach to {} failed: {}", target_id, source);
                self.state = SessionState::Inactive;
                return Err(MonitorError::Attach {
                    target_id: target_id.to_string(),
                    source,
                });
            }
        };

        if let Err(source) = self.debugger.enable_network(target_id).await {
            tracing::error!("[Monitor] Network.enable on {} failed: {}", target_id, source);
            if let Err(e) = self.debugger.detach(target_id).await {
                tracing::warn!("[Monitor] Cleanup detach of {} failed: {}", target_id, e);
            }
            self.state = SessionState::Inactive;
            return Err(MonitorError::EnableNetwork {
                target_id: target_id.to_string(),
                source,
            });
        }

        let origin = domain_of(&attached.url);
        self.tracker.set_origin(origin.clone());
        self.session = Some(ActiveSession {
            id,
            target_id: target_id.to_string(),
            cdp_session: attached.session_id,
            label: label.to_string(),
        });
        self.state = SessionState::Active;

        self.persist(&SessionMetadata::active(label, origin.as_str()))
            .await;
        self.bus.publish(SinkMessage::Clear);

        tracing::info!(
            "[Monitor] Session {} active on {} (origin {:?})",
            id,
            target_id,
            origin
        );
        Ok(self.status())
    }

    /// Stop monitoring. A no-op when inactive; detach failures are logged and
    /// the controller still ends up `Inactive`.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Inactive {
            return;
        }
        self.state = SessionState::Detaching;

        if let Some(session) = self.session.take() {
            tracing::info!(
                "[Monitor] Session {} detaching from {}",
                session.id,
                session.target_id
            );
            if let Err(e) = self.debugger.detach(&session.target_id).await {
                tracing::warn!(
                    "[Monitor] Detach from {} failed, dropping session anyway: {}",
                    session.target_id,
                    e
                );
            }
        }

        let orphaned = self.tracker.in_flight_len();
        if orphaned > 0 {
            tracing::debug!("[Monitor] Dropping {} orphaned requests", orphaned);
        }
        self.tracker.reset();
        self.tracker.set_origin(String::new());
        self.bus.publish(SinkMessage::active_count(0));
        self.persist(&SessionMetadata::inactive()).await;

        self.state = SessionState::Inactive;
        tracing::info!("[Monitor] Stopped");
    }

    /// Route one network event through the tracker if it belongs to the
    /// current attachment. Returns how many sink messages it produced.
    pub fn handle_event(&mut self, event: TargetEvent) -> usize {
        if !self.accepts(&event) {
            tracing::trace!(
                "[Monitor] Ignoring {} for {} (not the monitored session)",
                event.event.request_id(),
                event.target_id
            );
            return 0;
        }

        let messages = self.tracker.handle(event.event);
        let produced = messages.len();
        for message in messages {
            self.bus.publish(message);
        }
        produced
    }

    fn accepts(&self, event: &TargetEvent) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        let Some(session) = &self.session else {
            return false;
        };
        event.target_id == session.target_id
            && event
                .session_id
                .as_ref()
                .map_or(true, |sid| *sid == session.cdp_session)
    }

    async fn persist(&self, metadata: &SessionMetadata) {
        if let Err(e) = self.store.save(metadata).await {
            tracing::warn!("[Monitor] Could not persist session metadata: {}", e);
        }
    }
}
