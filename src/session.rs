//! Upper-layer session state
//!
//! The session cycles Closed -> Connecting -> Open -> Closed. It only moves
//! toward Open while the link is up. Every close schedules a single gated
//! reconnect: wait for `LINK_UP`, sleep the cooldown, confirm the link is
//! still up, then ask the transport to reconnect. At most one such sequence
//! is outstanding at a time.
//!
//! The session lock also serializes publishes, so nothing reaches the
//! transport while `SESSION_UP` is clear.

use crate::error::{SessionError, SessionErrorKind};
use crate::gate::{ConditionGate, ReadyFlags};
use crate::observability::StationMetrics;
use crate::session_span;
use crate::transport::{Delivery, SessionEvent, SessionTransport};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Payload of the one-time liveness message
pub const LIVENESS_PAYLOAD: &[u8] = b"data";

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Closed,
    Connecting,
    Open,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Closed => write!(f, "closed"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Open => write!(f, "open"),
        }
    }
}

/// Session tuning taken from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Pause between the link coming back and the reconnect request
    pub reconnect_delay: Duration,
    /// Destination of the liveness message sent on the first Open
    pub liveness_topic: Option<String>,
}

#[derive(Debug)]
struct Inner {
    status: SessionStatus,
    /// Id of the outstanding attempt task, if any
    pending_attempt: Option<u64>,
    next_attempt: u64,
    attempt_task: Option<JoinHandle<()>>,
    /// Set by `shutdown`; no further attempts are scheduled
    stopped: bool,
    /// The transport has seen an establish request
    attempted: bool,
    /// A liveness message went out already
    announced: bool,
}

/// Owner of the session status
pub struct SessionState {
    inner: Mutex<Inner>,
    gate: ConditionGate,
    transport: Arc<dyn SessionTransport>,
    metrics: Arc<StationMetrics>,
    settings: SessionSettings,
}

impl SessionState {
    pub fn new(
        gate: ConditionGate,
        transport: Arc<dyn SessionTransport>,
        metrics: Arc<StationMetrics>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                status: SessionStatus::Closed,
                pending_attempt: None,
                next_attempt: 0,
                attempt_task: None,
                stopped: false,
                attempted: false,
                announced: false,
            }),
            gate,
            transport,
            metrics,
            settings,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    /// True while an attempt is waiting on the link or the cooldown
    pub fn reconnect_pending(&self) -> bool {
        self.lock().pending_attempt.is_some()
    }

    /// Run `f` with the status while holding the session lock
    pub fn observe<R>(&self, f: impl FnOnce(SessionStatus) -> R) -> R {
        let inner = self.lock();
        f(inner.status)
    }

    /// Schedule the first establish: wait for the link, no cooldown
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.lock();
        self.schedule_attempt(&mut inner, Duration::ZERO);
    }

    /// Abort any pending attempt and refuse to schedule new ones
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.stopped = true;
        inner.pending_attempt = None;
        if let Some(task) = inner.attempt_task.take() {
            task.abort();
        }
    }

    /// Dispatch one transport notification
    pub fn handle_event(self: &Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::Established => self.on_established(),
            SessionEvent::Closed(error) => self.on_closed_or_error(error),
            SessionEvent::MessageReceived { topic, payload } => {
                self.metrics.message_received();
                info!(
                    topic = %topic,
                    payload = %String::from_utf8_lossy(&payload),
                    "Message received"
                );
            }
            SessionEvent::Acknowledged { message_id } => {
                debug!(message_id, "Publish acknowledged");
            }
        }
    }

    pub fn on_established(self: &Arc<Self>) {
        let _span = session_span!(event = "established").entered();
        let mut inner = self.lock();

        if !self.gate.flags().contains(ReadyFlags::LINK_UP) {
            warn!(
                status = %inner.status,
                "Ignoring stale session establishment while link is down"
            );
            return;
        }

        inner.status = SessionStatus::Open;
        inner.pending_attempt = None;
        self.gate.set(ReadyFlags::SESSION_UP);
        self.metrics.session_opened();
        info!("Session open");

        if !inner.announced {
            inner.announced = true;
            if let Some(topic) = &self.settings.liveness_topic {
                match self
                    .transport
                    .publish(topic, LIVENESS_PAYLOAD, Delivery::AtMostOnce)
                {
                    Ok(()) => info!(topic = %topic, "Liveness message sent"),
                    Err(e) => warn!(topic = %topic, error = %e, "Liveness message refused"),
                }
            }
        }
    }

    pub fn on_closed_or_error(self: &Arc<Self>, error: SessionError) {
        let _span = session_span!(event = "closed").entered();
        let mut inner = self.lock();
        self.close_locked(&mut inner, &error);
    }

    /// Close the session in the same locked step as the link goes down
    ///
    /// `link_transition` runs under the session lock, so no observer can see
    /// the link leave `Up` while the session is still `Open`.
    pub fn on_link_lost<R>(self: &Arc<Self>, link_transition: impl FnOnce() -> R) -> R {
        let _span = session_span!(event = "link_lost").entered();
        let mut inner = self.lock();

        if inner.status != SessionStatus::Closed {
            info!(from = %inner.status, "Closing session: link lost");
            inner.status = SessionStatus::Closed;
            self.metrics.session_closed();
        }
        self.gate.clear(ReadyFlags::SESSION_UP);

        let outcome = link_transition();
        self.schedule_attempt(&mut inner, self.settings.reconnect_delay);
        outcome
    }

    /// Publish if and only if the session is open
    pub fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), SessionError> {
        let inner = self.lock();
        if inner.status != SessionStatus::Open {
            return Err(SessionError::NotOpen {
                status: inner.status,
            });
        }
        self.transport.publish(destination, payload, delivery)
    }

    fn close_locked(self: &Arc<Self>, inner: &mut Inner, error: &SessionError) {
        let kind = error.kind();
        match kind {
            SessionErrorKind::Transport => {
                warn!(kind = %kind, error = %error, from = %inner.status, "Session closed")
            }
            SessionErrorKind::Other => {
                info!(kind = %kind, error = %error, from = %inner.status, "Session closed")
            }
        }

        if inner.status != SessionStatus::Closed {
            inner.status = SessionStatus::Closed;
            self.metrics.session_closed();
        }
        self.gate.clear(ReadyFlags::SESSION_UP);
        self.schedule_attempt(inner, self.settings.reconnect_delay);
    }

    fn schedule_attempt(self: &Arc<Self>, inner: &mut Inner, cooldown: Duration) {
        if inner.stopped {
            return;
        }
        if let Some(id) = inner.pending_attempt {
            debug!(attempt = id, "Reconnect already pending");
            return;
        }

        let id = inner.next_attempt;
        inner.next_attempt += 1;
        inner.pending_attempt = Some(id);
        debug!(attempt = id, cooldown = ?cooldown, "Reconnect scheduled");

        let session = Arc::clone(self);
        inner.attempt_task = Some(tokio::spawn(
            async move { session.run_attempt(id, cooldown).await }
                .instrument(session_span!(attempt = id)),
        ));
    }

    async fn run_attempt(self: Arc<Self>, id: u64, cooldown: Duration) {
        loop {
            if self.gate.wait_all(ReadyFlags::LINK_UP, None).await.is_err() {
                return;
            }
            if !cooldown.is_zero() {
                tokio::time::sleep(cooldown).await;
            }

            match self.issue_attempt(id) {
                AttemptStep::WaitForLink => continue,
                AttemptStep::Done => return,
            }
        }
    }

    /// Re-check the link under the session lock and ask the transport
    fn issue_attempt(self: &Arc<Self>, id: u64) -> AttemptStep {
        let mut inner = self.lock();
        if inner.pending_attempt != Some(id) || inner.status != SessionStatus::Closed {
            debug!(attempt = id, status = %inner.status, "Reconnect superseded");
            return AttemptStep::Done;
        }
        if !self.gate.flags().contains(ReadyFlags::LINK_UP) {
            debug!(attempt = id, "Link dropped during cooldown; waiting again");
            return AttemptStep::WaitForLink;
        }

        inner.pending_attempt = None;
        inner.status = SessionStatus::Connecting;
        self.metrics.reconnect_attempted();

        let result = if inner.attempted {
            info!(attempt = id, "Reconnecting session");
            self.transport.reconnect()
        } else {
            info!(attempt = id, "Establishing session");
            self.transport.establish()
        };
        inner.attempted = true;

        if let Err(error) = result {
            self.close_locked(&mut inner, &error);
        }
        AttemptStep::Done
    }
}

enum AttemptStep {
    WaitForLink,
    Done,
}
