//! Conference event loop
//!
//! [`ConferenceService`] owns the three conference policies and runs them on
//! one task. Everything that can change a grouping (a leg appearing,
//! changing or going away, an IMS roster, the routing layer catching up, the
//! CDMA admission timer) is an event on that task's queue, so no policy ever
//! sees a half-applied update from another.
//!
//! Legs are dispatched by [`RadioTechnology`]: IMS to the IMS controller, GSM
//! to the generic group, CDMA to the CDMA group. A leg whose technology
//! changes moves between policies; an IMS conference host that moves to a
//! circuit-switched radio is replaced by its SRVCC clone.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conference::cdma::CdmaConferenceGroup;
use crate::conference::generic::GenericConferenceGroup;
use crate::conference::ims_controller::ImsConferenceController;
use crate::conference::participant::ConferenceParticipant;
use crate::conference::Conference;
use crate::config::TelephonyConfig;
use crate::connection::Connection;
use crate::error::{Result, TelephonyError};
use crate::radio::RadioRef;
use crate::routing::CallRouting;
use crate::types::{ConferenceId, ConnectionId, RadioId, RadioTechnology};

/// Events processed by the conference task
#[derive(Debug)]
pub enum ConferenceEvent {
    ConnectionAdded(ConnectionId),
    ConnectionChanged(ConnectionId),
    ConnectionRemoved(ConnectionId),
    RosterUpdated {
        host: ConnectionId,
        roster: Vec<ConferenceParticipant>,
    },
    /// The routing layer registered a connection
    RoutingRegistered(ConnectionId),
    CdmaAdmissionTimeout {
        generation: u64,
    },
    Merge {
        conference: ConferenceId,
        reply: oneshot::Sender<Result<()>>,
    },
    Swap {
        conference: ConferenceId,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        conference: ConferenceId,
        reply: oneshot::Sender<Result<()>>,
    },
    CanAddOutgoingCall {
        reply: oneshot::Sender<bool>,
    },
    ListConferences {
        reply: oneshot::Sender<Vec<Arc<Conference>>>,
    },
}

/// Per-technology policies plus the technology each leg was last filed under
struct ConferenceControllers {
    registry: Arc<DashMap<ConnectionId, Arc<Connection>>>,
    cdma: CdmaConferenceGroup,
    generic: GenericConferenceGroup,
    ims: ImsConferenceController,
    filed_under: HashMap<ConnectionId, RadioTechnology>,
}

impl ConferenceControllers {
    fn handle(&mut self, event: ConferenceEvent) {
        match event {
            ConferenceEvent::ConnectionAdded(id) | ConferenceEvent::ConnectionChanged(id) => {
                self.connection_changed(id)
            }
            ConferenceEvent::ConnectionRemoved(id) => self.connection_removed(id),
            ConferenceEvent::RosterUpdated { host, roster } => {
                if !self.ims.on_roster_update(host, &roster) {
                    debug!("Roster for {} does not match any IMS conference", host);
                }
            }
            ConferenceEvent::RoutingRegistered(id) => {
                debug!("Routing registered {}", id);
                self.generic.on_routing_registered();
            }
            ConferenceEvent::CdmaAdmissionTimeout { generation } => {
                self.cdma.on_admission_timeout(generation)
            }
            ConferenceEvent::Merge { conference, reply } => {
                let _ = reply.send(self.merge(conference));
            }
            ConferenceEvent::Swap { conference, reply } => {
                let result = self.cdma.swap(conference).map(|_| ());
                let _ = reply.send(result);
            }
            ConferenceEvent::Disconnect { conference, reply } => {
                let result = match self.ims.group(conference) {
                    Some(group) => group.disconnect(),
                    None => Err(TelephonyError::ConferenceNotFound(conference)),
                };
                let _ = reply.send(result);
            }
            ConferenceEvent::CanAddOutgoingCall { reply } => {
                let _ = reply.send(self.cdma.can_add_outgoing_call());
            }
            ConferenceEvent::ListConferences { reply } => {
                let _ = reply.send(self.conferences());
            }
        }
    }

    fn connection_changed(&mut self, id: ConnectionId) {
        let Some(connection) = self.registry.get(&id).map(|c| Arc::clone(c.value())) else {
            debug!("Change for unknown connection {} ignored", id);
            return;
        };

        if self.ims.group_for_host(id).is_some() {
            if let Some(clone) = self.ims.on_host_changed(id) {
                info!("SRVCC: {} replaced by {}", id, clone.id());
                self.registry.remove(&id);
                self.filed_under.remove(&id);
                let clone_id = clone.id();
                self.registry.insert(clone_id, clone);
                self.connection_changed(clone_id);
            }
            return;
        }

        let technology = connection.technology();
        match self.filed_under.get(&id).copied() {
            Some(previous) if previous == technology => self.recalculate(technology),
            Some(previous) => {
                info!("{} moved from {:?} to {:?}", id, previous, technology);
                self.detach(id, previous);
                self.attach(connection, technology);
            }
            None => self.attach(connection, technology),
        }
        if self.ims.group_for_host(id).is_some() {
            // Promoted to conference host; no longer a plain IMS leg.
            self.filed_under.remove(&id);
        }
    }

    fn attach(&mut self, connection: Arc<Connection>, technology: RadioTechnology) {
        let id = connection.id();
        self.filed_under.insert(id, technology);
        match technology {
            RadioTechnology::Ims => self.ims.add(connection),
            RadioTechnology::Gsm => {
                self.generic.add(connection);
            }
            RadioTechnology::Cdma => self.cdma.add(connection),
        }
    }

    fn detach(&mut self, id: ConnectionId, technology: RadioTechnology) {
        self.filed_under.remove(&id);
        match technology {
            RadioTechnology::Ims => self.ims.remove(id),
            RadioTechnology::Gsm => {
                self.generic.remove(id);
            }
            RadioTechnology::Cdma => self.cdma.remove(id),
        }
    }

    fn recalculate(&mut self, technology: RadioTechnology) {
        match technology {
            RadioTechnology::Ims => self.ims.on_connection_changed(),
            RadioTechnology::Gsm => {
                self.generic.recalculate();
            }
            RadioTechnology::Cdma => self.cdma.recalculate(),
        }
    }

    fn connection_removed(&mut self, id: ConnectionId) {
        self.registry.remove(&id);
        if self.ims.on_host_removed(id) {
            return;
        }
        if let Some(technology) = self.filed_under.get(&id).copied() {
            self.detach(id, technology);
        }
    }

    fn merge(&mut self, conference: ConferenceId) -> Result<()> {
        if let Some(group) = self.ims.group(conference) {
            return group.merge();
        }
        if self.cdma.conference().is_some_and(|c| c.id() == conference) {
            return self.cdma.merge(conference).map(|_| ());
        }
        if self.generic.conference().is_some_and(|c| c.id() == conference) {
            // GSM legs join by becoming multiparty; nothing to send.
            return Ok(());
        }
        Err(TelephonyError::ConferenceNotFound(conference))
    }

    fn conferences(&self) -> Vec<Arc<Conference>> {
        let mut all: Vec<Arc<Conference>> = Vec::new();
        all.extend(self.generic.conference().cloned());
        all.extend(self.cdma.conference().cloned());
        all.extend(self.ims.groups().iter().map(|g| Arc::clone(g.conference())));
        all
    }
}

/// Handle to the conference task
pub struct ConferenceService {
    registry: Arc<DashMap<ConnectionId, Arc<Connection>>>,
    event_tx: mpsc::UnboundedSender<ConferenceEvent>,
    worker: JoinHandle<()>,
}

impl ConferenceService {
    /// Spawn the conference task.
    ///
    /// `own_numbers` lists the device's numbers per radio, used to recognize
    /// the device itself in IMS rosters. Must be called from within a tokio
    /// runtime.
    pub fn new(
        config: &TelephonyConfig,
        radios: Vec<RadioRef>,
        own_numbers: HashMap<RadioId, Vec<String>>,
        routing: Arc<dyn CallRouting>,
    ) -> Self {
        let radios: HashMap<RadioId, RadioRef> = radios.into_iter().map(|r| (r.id(), r)).collect();
        let registry = Arc::new(DashMap::new());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let mut controllers = ConferenceControllers {
            registry: Arc::clone(&registry),
            cdma: CdmaConferenceGroup::new(
                Arc::clone(&routing),
                radios.clone(),
                config.conference.cdma_admission_delay(),
                event_tx.clone(),
            ),
            generic: GenericConferenceGroup::new(Arc::clone(&routing), config.conference.max_generic_size),
            ims: ImsConferenceController::new(routing, radios, own_numbers, config.carrier.clone()),
            filed_under: HashMap::new(),
        };

        let worker = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                controllers.handle(event);
            }
            debug!("Conference service stopped");
        });

        Self {
            registry,
            event_tx,
            worker,
        }
    }

    fn send(&self, event: ConferenceEvent) -> Result<()> {
        self.event_tx.send(event).map_err(|_| TelephonyError::ServiceStopped)
    }

    /// Start tracking a leg
    pub fn add_connection(&self, connection: Arc<Connection>) -> Result<()> {
        let id = connection.id();
        self.registry.insert(id, connection);
        self.send(ConferenceEvent::ConnectionAdded(id))
    }

    /// A tracked leg's state, flags or technology changed
    pub fn connection_changed(&self, id: ConnectionId) -> Result<()> {
        if !self.registry.contains_key(&id) {
            return Err(TelephonyError::ConnectionNotFound(id));
        }
        self.send(ConferenceEvent::ConnectionChanged(id))
    }

    pub fn remove_connection(&self, id: ConnectionId) -> Result<()> {
        self.send(ConferenceEvent::ConnectionRemoved(id))
    }

    /// Full roster reported by an IMS conference host
    pub fn roster_updated(&self, host: ConnectionId, roster: Vec<ConferenceParticipant>) -> Result<()> {
        self.send(ConferenceEvent::RosterUpdated { host, roster })
    }

    /// The routing layer finished registering a leg
    pub fn routing_registered(&self, id: ConnectionId) -> Result<()> {
        self.send(ConferenceEvent::RoutingRegistered(id))
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get(&id).map(|c| Arc::clone(c.value()))
    }

    pub async fn merge(&self, conference: ConferenceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ConferenceEvent::Merge { conference, reply })?;
        rx.await.map_err(|_| TelephonyError::ServiceStopped)?
    }

    pub async fn swap(&self, conference: ConferenceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ConferenceEvent::Swap { conference, reply })?;
        rx.await.map_err(|_| TelephonyError::ServiceStopped)?
    }

    /// Hang up an IMS conference
    pub async fn disconnect(&self, conference: ConferenceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ConferenceEvent::Disconnect { conference, reply })?;
        rx.await.map_err(|_| TelephonyError::ServiceStopped)?
    }

    /// False while an unmerged CDMA conference would swallow a new call
    pub async fn can_add_outgoing_call(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(ConferenceEvent::CanAddOutgoingCall { reply })?;
        rx.await.map_err(|_| TelephonyError::ServiceStopped)
    }

    /// Live conferences, after every previously sent event was processed
    pub async fn conferences(&self) -> Result<Vec<Arc<Conference>>> {
        let (reply, rx) = oneshot::channel();
        self.send(ConferenceEvent::ListConferences { reply })?;
        rx.await.map_err(|_| TelephonyError::ServiceStopped)
    }
}

impl Drop for ConferenceService {
    fn drop(&mut self) {
        if !self.worker.is_finished() {
            warn!("Conference service dropped with task running, aborting");
        }
        self.worker.abort();
    }
}
