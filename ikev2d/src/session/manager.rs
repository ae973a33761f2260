//! Per-family session manager and dispatcher loop.

use super::expiry::{ExpiryMode, ExpiryPolicy};
use super::handler::SessionHandler;
use super::state::Session;
use crate::error::Result;
use crate::netio::{EndpointQueues, Family, PacketRecord};
use crate::routing::PeerKey;
use crate::sync::ConcurrentTable;
use crate::telemetry::{record_metric, MetricsEvent};
use crate::timer::TimerEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Live sessions of one address family.
pub type SessionTable = ConcurrentTable<PeerKey, Session>;

/// What [`SessionManager::dispatch`] did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// A new session was created for the record's peer.
    pub created: bool,
    /// Replies queued for sending.
    pub replies: usize,
}

/// Routes inbound records of one address family to their sessions.
///
/// Shared (behind an `Arc`) by every dispatcher task of the family.
pub struct SessionManager {
    family: Family,
    queues: EndpointQueues,
    sessions: Arc<SessionTable>,
    timer: Arc<TimerEngine>,
    handler: Arc<dyn SessionHandler>,
    expiry: ExpiryPolicy,
}

impl SessionManager {
    pub fn new(
        family: Family,
        queues: EndpointQueues,
        timer: Arc<TimerEngine>,
        handler: Arc<dyn SessionHandler>,
        expiry: ExpiryPolicy,
    ) -> Self {
        Self {
            family,
            queues,
            sessions: Arc::new(SessionTable::new()),
            timer,
            handler,
            expiry,
        }
    }

    /// Dispatcher loop: runs until the receive queue is closed.
    pub fn handle_sessions(&self) -> Result<()> {
        info!(family = %self.family, "Dispatcher started");

        let mut handled: u64 = 0;
        while let Some(record) = self.queues.inbound.pop() {
            self.dispatch(&record);
            handled += 1;
        }

        info!(family = %self.family, handled, "Dispatcher stopped, receive queue closed");
        Ok(())
    }

    /// Route one inbound record to its session and queue the replies.
    pub fn dispatch(&self, record: &PacketRecord) -> Dispatched {
        let key = PeerKey::from_addr(&record.peer());
        let peer = record.peer();
        let (session, created) = self
            .sessions
            .find_or_insert_with(key, |key| Session::new(key.clone(), peer));

        if created {
            record_metric(MetricsEvent::SessionCreated);
            debug!(family = %self.family, peer = %session.key(), "Session created");
            self.arm_expiry(&session);
        } else if self.expiry.mode() == ExpiryMode::Sliding {
            self.arm_expiry(&session);
        }

        let replies = session.process(self.handler.as_ref(), record.payload());
        let count = replies.len();
        trace!(family = %self.family, peer = %session.key(), len = record.len(), replies = count, "Datagram dispatched");

        for reply in replies {
            if !self.queues.outbound.push(Arc::new(reply)) {
                debug!(family = %self.family, peer = %session.key(), "Send queue closed, reply dropped");
            }
        }

        Dispatched {
            created,
            replies: count,
        }
    }

    /// (Re)arm the one-shot timer that removes `session` from the table.
    fn arm_expiry(&self, session: &Arc<Session>) {
        let mut expiry = session.expiry_state();
        expiry.generation += 1;
        let generation = expiry.generation;

        let sessions = Arc::downgrade(&self.sessions);
        let target = Arc::downgrade(session);
        let family = self.family;

        let id = self.timer.schedule(self.expiry.timeout(), false, move || {
            let (sessions, session) = match (sessions.upgrade(), target.upgrade()) {
                (Some(sessions), Some(session)) => (sessions, session),
                _ => return,
            };
            // Held across the removal so a concurrent re-arm cannot slip in.
            let expiry = session.expiry_state();
            if expiry.generation != generation {
                return;
            }
            if sessions.remove_if_same(session.key(), &session) {
                record_metric(MetricsEvent::SessionExpired);
                debug!(family = %family, peer = %session.key(), packets = session.packets(), "Session expired");
            }
            drop(expiry);
        });

        if let Some(previous) = expiry.event.replace(id) {
            self.timer.cancel(previous);
        }
    }

    /// Close both queues, releasing every dispatcher and send loop of the
    /// family.
    pub fn shutdown(&self) {
        self.queues.inbound.close();
        self.queues.outbound.close();
        info!(family = %self.family, sessions = self.sessions.len(), "Session manager shut down");
    }

    /// Drop every session, returning how many were live.
    pub fn clear_sessions(&self) -> usize {
        self.sessions.clear()
    }

    /// Apply a new session timeout and expiry mode to future timers.
    pub fn update_expiry(&self, timeout: Duration, mode: ExpiryMode) {
        self.expiry.update(timeout, mode);
        info!(family = %self.family, timeout_ms = timeout.as_millis() as u64, %mode, "Session expiry updated");
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    pub fn queues(&self) -> &EndpointQueues {
        &self.queues
    }

    pub fn expiry(&self) -> &ExpiryPolicy {
        &self.expiry
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("family", &self.family)
            .field("sessions", &self.sessions.len())
            .field("expiry", &self.expiry)
            .finish()
    }
}
