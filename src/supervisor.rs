//! Composition root
//!
//! The supervisor wires one gate into both state machines and the publish
//! scheduler, and owns them along with the platform collaborators. `start`
//! spawns the two dispatch loops, the session startup task and the scheduler,
//! then brings the network stack up.

use crate::config::StationConfig;
use crate::error::{StationError, StationResult};
use crate::gate::{ConditionGate, ReadyFlags};
use crate::link::{LinkState, LinkStatus};
use crate::observability::StationMetrics;
use crate::publisher::{PublishScheduler, PublishSettings};
use crate::sensor::SensorSource;
use crate::session::{SessionSettings, SessionState, SessionStatus};
use crate::transport::{NetworkEvent, NetworkStack, SessionEvent, SessionTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Consistent view of both layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationSnapshot {
    pub link: LinkStatus,
    pub session: SessionStatus,
    pub flags: ReadyFlags,
}

impl StationSnapshot {
    pub fn link_up(&self) -> bool {
        self.flags.contains(ReadyFlags::LINK_UP)
    }

    pub fn session_up(&self) -> bool {
        self.flags.contains(ReadyFlags::SESSION_UP)
    }
}

/// Platform collaborators handed to the supervisor
pub struct Collaborators {
    pub network: Arc<dyn NetworkStack>,
    pub transport: Arc<dyn SessionTransport>,
    pub sensor: Arc<dyn SensorSource>,
}

pub struct Supervisor {
    link: Arc<LinkState>,
    session: Arc<SessionState>,
    scheduler: Option<PublishScheduler>,
    network: Arc<dyn NetworkStack>,
    metrics: Arc<StationMetrics>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Wire every component from configuration
    pub fn new(config: &StationConfig, collaborators: Collaborators) -> StationResult<Self> {
        Self::with_gate(config, ConditionGate::new(), collaborators)
    }

    /// Wire every component around an existing gate
    pub fn with_gate(
        config: &StationConfig,
        gate: ConditionGate,
        collaborators: Collaborators,
    ) -> StationResult<Self> {
        let metrics = Arc::new(StationMetrics::new());

        let link = Arc::new(LinkState::new(
            gate.clone(),
            Arc::clone(&collaborators.network),
            Arc::clone(&metrics),
        ));

        let session = SessionState::new(
            gate.clone(),
            collaborators.transport,
            Arc::clone(&metrics),
            SessionSettings {
                reconnect_delay: config.mqtt.reconnect_delay(),
                liveness_topic: config.mqtt.liveness_topic.clone(),
            },
        );

        let scheduler = PublishScheduler::new(
            gate,
            Arc::clone(&session),
            collaborators.sensor,
            Arc::clone(&metrics),
            PublishSettings {
                interval: config.sensor.publish_interval(),
                temperature_topic: config.mqtt.temperature_topic.clone(),
                humidity_topic: config.mqtt.humidity_topic.clone(),
            },
        )?;

        Ok(Self {
            link,
            session,
            scheduler: Some(scheduler),
            network: collaborators.network,
            metrics,
            tasks: Vec::new(),
        })
    }

    /// Spawn the dispatch loops and the scheduler, then start the network stack
    pub fn start(
        &mut self,
        network_events: mpsc::Receiver<NetworkEvent>,
        session_events: mpsc::Receiver<SessionEvent>,
    ) -> StationResult<()> {
        let scheduler = self.scheduler.take().ok_or(StationError::AlreadyStarted)?;

        self.tasks.push(tokio::spawn(dispatch_network(
            Arc::clone(&self.link),
            Arc::clone(&self.session),
            network_events,
        )));
        self.tasks.push(tokio::spawn(dispatch_session(
            Arc::clone(&self.session),
            session_events,
        )));

        self.session.start();
        self.tasks.push(tokio::spawn(scheduler.run()));

        info!("Starting network stack");
        self.network.start()?;
        Ok(())
    }

    /// Session status, link status and flags read in one locked step
    pub fn snapshot(&self) -> StationSnapshot {
        self.session.observe(|session| {
            let (link, flags) = self.link.status_with_flags();
            StationSnapshot {
                link,
                session,
                flags,
            }
        })
    }

    pub fn link(&self) -> &Arc<LinkState> {
        &self.link
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn metrics(&self) -> &Arc<StationMetrics> {
        &self.metrics
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.session.shutdown();
    }
}

/// Feed network notifications into the link; disconnects also close the session
async fn dispatch_network(
    link: Arc<LinkState>,
    session: Arc<SessionState>,
    mut events: mpsc::Receiver<NetworkEvent>,
) {
    while let Some(event) = events.recv().await {
        debug!(event = ?event, "Network event");
        match &event {
            NetworkEvent::Disconnected { .. } => {
                session.on_link_lost(|| link.handle_event(&event));
            }
            _ => {
                link.handle_event(&event);
            }
        }
    }
    debug!("Network event channel closed");
}

async fn dispatch_session(session: Arc<SessionState>, mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        debug!(event = ?event, "Session event");
        session.handle_event(event);
    }
    debug!("Session event channel closed");
}
