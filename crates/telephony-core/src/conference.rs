//! Conference objects and the three grouping policies
//!
//! A [`Conference`] is the object handed to the routing layer: a named set of
//! member connections with its own state, capabilities and properties. The
//! policies that decide when a conference exists and who is in it live in
//! the submodules:
//!
//! - [`cdma`]: one-shot merge with a delayed-admission dialing illusion
//! - [`generic`]: multiparty GSM legs, capped and registration-gated
//! - [`ims`] / [`ims_controller`]: network-hosted conferences driven by roster updates
//! - [`service`]: the event loop dispatching connections to the right policy

pub mod cdma;
pub mod generic;
pub mod ims;
pub mod ims_controller;
pub mod participant;
pub mod service;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capabilities::{Capabilities, Properties};
use crate::connection::Connection;
use crate::types::{CallState, ConferenceId, ConnectionId, DisconnectCause, RadioTechnology};

#[derive(Debug)]
struct ConferenceInner {
    state: CallState,
    capabilities: Capabilities,
    properties: Properties,
    members: Vec<Arc<Connection>>,
    connect_time: Option<DateTime<Utc>>,
    disconnect_cause: Option<DisconnectCause>,
    destroyed: bool,
}

/// A group of connections presented to the user as one call
#[derive(Debug)]
pub struct Conference {
    id: ConferenceId,
    technology: RadioTechnology,
    inner: RwLock<ConferenceInner>,
}

impl Conference {
    pub fn new(technology: RadioTechnology, capabilities: Capabilities) -> Self {
        Self {
            id: ConferenceId::new(),
            technology,
            inner: RwLock::new(ConferenceInner {
                state: CallState::New,
                capabilities,
                properties: Properties::empty(),
                members: Vec::new(),
                connect_time: None,
                disconnect_cause: None,
                destroyed: false,
            }),
        }
    }

    pub fn id(&self) -> ConferenceId {
        self.id
    }

    pub fn technology(&self) -> RadioTechnology {
        self.technology
    }

    pub fn state(&self) -> CallState {
        self.inner.read().state
    }

    pub fn set_state(&self, state: CallState) {
        let mut inner = self.inner.write();
        if inner.destroyed || inner.state == state {
            return;
        }
        debug!("Conference {} state {} -> {}", self.id, inner.state, state);
        if state == CallState::Active && inner.connect_time.is_none() {
            inner.connect_time = Some(Utc::now());
        }
        inner.state = state;
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.read().capabilities
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.inner.write().capabilities = capabilities;
    }

    /// Read-modify-write of the capability set under one lock
    pub fn update_capabilities(&self, f: impl FnOnce(&mut Capabilities)) {
        f(&mut self.inner.write().capabilities);
    }

    pub fn properties(&self) -> Properties {
        self.inner.read().properties
    }

    pub fn update_properties(&self, f: impl FnOnce(&mut Properties)) {
        f(&mut self.inner.write().properties);
    }

    pub fn connect_time(&self) -> Option<DateTime<Utc>> {
        self.inner.read().connect_time
    }

    pub fn set_connect_time(&self, time: Option<DateTime<Utc>>) {
        self.inner.write().connect_time = time;
    }

    /// Add a member; returns false if it was already a member
    pub fn add_connection(&self, connection: &Arc<Connection>) -> bool {
        let mut inner = self.inner.write();
        if inner.members.iter().any(|c| c.id() == connection.id()) {
            return false;
        }
        connection.set_conference(Some(self.id));
        inner.members.push(Arc::clone(connection));
        true
    }

    /// Remove a member; returns false if it was not a member
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.write();
        let Some(pos) = inner.members.iter().position(|c| c.id() == id) else {
            return false;
        };
        let removed = inner.members.remove(pos);
        if removed.conference() == Some(self.id) {
            removed.set_conference(None);
        }
        true
    }

    pub fn members(&self) -> Vec<Arc<Connection>> {
        self.inner.read().members.clone()
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.inner.read().members.iter().map(|c| c.id()).collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().members.iter().any(|c| c.id() == id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().members.is_empty()
    }

    /// First member; the one whose state the conference mirrors
    pub fn primary(&self) -> Option<Arc<Connection>> {
        self.inner.read().members.first().cloned()
    }

    pub fn set_disconnected(&self, cause: DisconnectCause) {
        let mut inner = self.inner.write();
        if inner.state == CallState::Disconnected {
            return;
        }
        inner.state = CallState::Disconnected;
        inner.disconnect_cause = Some(cause);
    }

    pub fn disconnect_cause(&self) -> Option<DisconnectCause> {
        self.inner.read().disconnect_cause
    }

    /// Tear down: disconnect the conference itself and detach every member.
    ///
    /// Members keep their own state; only their conference link is cleared.
    pub fn destroy(&self, cause: DisconnectCause) {
        let members = {
            let mut inner = self.inner.write();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            if inner.state != CallState::Disconnected {
                inner.state = CallState::Disconnected;
                inner.disconnect_cause = Some(cause);
            }
            std::mem::take(&mut inner.members)
        };
        for member in members {
            if member.conference() == Some(self.id) {
                member.set_conference(None);
            }
        }
        info!("Conference {} destroyed ({:?})", self.id, cause);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.read().destroyed
    }
}
