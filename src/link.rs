//! Lower-layer network link state
//!
//! The link cycles Down -> Connecting -> Up -> Down. Transitions are driven
//! only by network stack notifications. Every change of the `Up` status and
//! the `LINK_UP` gate flag happens under the same lock, so observers never
//! see one without the other.

use crate::gate::{ConditionGate, ReadyFlags};
use crate::link_span;
use crate::observability::StationMetrics;
use crate::transport::{NetworkEvent, NetworkStack};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Network link status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Down,
    Connecting,
    Up,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Down => write!(f, "down"),
            LinkStatus::Connecting => write!(f, "connecting"),
            LinkStatus::Up => write!(f, "up"),
        }
    }
}

/// Outcome of applying one notification to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    /// Move to `next`; request a connect attempt when `connect` is set
    Move { next: LinkStatus, connect: bool },
    /// Notification does not apply in the current status
    Ignore,
}

/// Decide the next status for a notification (pure function)
///
/// A disconnect passes through Down and immediately requests one new
/// attempt, so its net effect is a move to Connecting. Down is only held
/// between the two steps under the status lock and is never observable,
/// unless the stack rejects the connect request.
pub fn determine_next_state(current: LinkStatus, event: &NetworkEvent) -> LinkTransition {
    match (current, event) {
        (LinkStatus::Down, NetworkEvent::StartRequested) => LinkTransition::Move {
            next: LinkStatus::Connecting,
            connect: true,
        },
        (LinkStatus::Connecting | LinkStatus::Up, NetworkEvent::Disconnected { .. }) => {
            LinkTransition::Move {
                next: LinkStatus::Connecting,
                connect: true,
            }
        }
        (LinkStatus::Connecting, NetworkEvent::AddressAcquired { .. }) => LinkTransition::Move {
            next: LinkStatus::Up,
            connect: false,
        },
        _ => LinkTransition::Ignore,
    }
}

/// Owner of the link status
pub struct LinkState {
    status: Mutex<LinkStatus>,
    gate: ConditionGate,
    network: Arc<dyn NetworkStack>,
    metrics: Arc<StationMetrics>,
}

impl LinkState {
    pub fn new(
        gate: ConditionGate,
        network: Arc<dyn NetworkStack>,
        metrics: Arc<StationMetrics>,
    ) -> Self {
        Self {
            status: Mutex::new(LinkStatus::Down),
            gate,
            network,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> LinkStatus {
        *self.lock()
    }

    /// Status and gate flags read under the link lock
    pub fn status_with_flags(&self) -> (LinkStatus, ReadyFlags) {
        let status = self.lock();
        (*status, self.gate.flags())
    }

    /// Apply one notification; returns true when the link left `Up`
    pub fn handle_event(&self, event: &NetworkEvent) -> bool {
        let _span = link_span!(event = ?event).entered();
        let mut status = self.lock();
        let previous = *status;

        match determine_next_state(previous, event) {
            LinkTransition::Ignore => {
                match event {
                    NetworkEvent::AddressAcquired { address } => {
                        warn!(
                            status = %previous,
                            %address,
                            "Ignoring out-of-order address notification"
                        );
                    }
                    other => {
                        debug!(status = %previous, event = ?other, "Ignoring link notification")
                    }
                }
                false
            }
            LinkTransition::Move { next, connect } => {
                if previous == LinkStatus::Up {
                    self.gate.clear(ReadyFlags::LINK_UP);
                    self.metrics.link_dropped();
                }
                if let NetworkEvent::Disconnected { reason } = event {
                    warn!(from = %previous, reason = %reason, "Link lost");
                }

                *status = next;
                if next == LinkStatus::Up {
                    self.gate.set(ReadyFlags::LINK_UP);
                    if let NetworkEvent::AddressAcquired { address } = event {
                        info!(%address, "Link up");
                    }
                }

                if connect {
                    self.request_connect(&mut status);
                }
                previous == LinkStatus::Up
            }
        }
    }

    pub fn on_start_requested(&self) {
        self.handle_event(&NetworkEvent::StartRequested);
    }

    /// Returns true when the link left `Up`
    pub fn on_disconnected(&self, reason: impl Into<String>) -> bool {
        self.handle_event(&NetworkEvent::Disconnected {
            reason: reason.into(),
        })
    }

    pub fn on_address_acquired(&self, address: IpAddr) {
        self.handle_event(&NetworkEvent::AddressAcquired { address });
    }

    /// Issue one connect request; a synchronous rejection leaves the link Down
    fn request_connect(&self, status: &mut LinkStatus) {
        self.metrics.connect_requested();
        match self.network.connect() {
            Ok(()) => debug!("Connect requested"),
            Err(e) => {
                warn!(error = %e, "Network stack rejected connect; waiting for next start");
                *status = LinkStatus::Down;
            }
        }
    }
}
