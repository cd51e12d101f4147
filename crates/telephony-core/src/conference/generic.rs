//! GSM (circuit-switched, non-CDMA) conference policy
//!
//! A leg is a conference candidate when its radio call reports multiparty
//! and it is Active or Holding. Two candidates form a conference; membership
//! is capped at `max_size` and legs past the cap are left out of
//! conferenceable pairing entirely.
//!
//! Membership is never changed around a leg the routing layer has not
//! registered yet. In that case the recalculation is parked
//! ([`Recalculation::Deferred`]) and re-run by
//! [`GenericConferenceGroup::on_routing_registered`].

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capabilities::Capabilities;
use crate::conference::Conference;
use crate::connection::Connection;
use crate::routing::{CallRouting, Conferenceable};
use crate::types::{CallState, ConnectionId, DisconnectCause, RadioTechnology};

/// Outcome of a recalculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recalculation {
    Applied,
    /// A candidate is not registered with routing yet
    Deferred,
}

pub struct GenericConferenceGroup {
    routing: Arc<dyn CallRouting>,
    max_size: usize,
    connections: Vec<Arc<Connection>>,
    conference: Option<Arc<Conference>>,
    recalculate_pending: bool,
}

impl GenericConferenceGroup {
    pub fn new(routing: Arc<dyn CallRouting>, max_size: usize) -> Self {
        Self {
            routing,
            max_size,
            connections: Vec::new(),
            conference: None,
            recalculate_pending: false,
        }
    }

    pub fn add(&mut self, connection: Arc<Connection>) -> Recalculation {
        if !self.tracks(connection.id()) {
            debug!("GSM group tracking {}", connection.id());
            self.connections.push(connection);
        }
        self.recalculate()
    }

    pub fn remove(&mut self, id: ConnectionId) -> Recalculation {
        self.connections.retain(|c| c.id() != id);
        if let Some(conference) = &self.conference {
            conference.remove_connection(id);
        }
        self.recalculate()
    }

    pub fn tracks(&self, id: ConnectionId) -> bool {
        self.connections.iter().any(|c| c.id() == id)
    }

    /// Re-run a parked recalculation once routing caught up
    pub fn on_routing_registered(&mut self) -> Option<Recalculation> {
        if self.recalculate_pending {
            Some(self.recalculate())
        } else {
            None
        }
    }

    pub fn is_recalculate_pending(&self) -> bool {
        self.recalculate_pending
    }

    pub fn conference(&self) -> Option<&Arc<Conference>> {
        self.conference.as_ref()
    }

    fn is_full(&self) -> bool {
        self.conference
            .as_ref()
            .is_some_and(|c| c.len() >= self.max_size)
    }

    /// Candidates in admission order: current members first, then tracking order
    fn eligible(&self) -> Vec<Arc<Connection>> {
        let is_candidate = |c: &Arc<Connection>| {
            c.is_multiparty() && c.radio_state().is_established() && !c.is_disconnected()
        };
        let mut eligible: Vec<Arc<Connection>> = self
            .conference
            .as_ref()
            .map(|conf| conf.members().into_iter().filter(|c| is_candidate(c) && self.tracks(c.id())).collect())
            .unwrap_or_default();
        for c in &self.connections {
            if is_candidate(c) && !eligible.iter().any(|e| e.id() == c.id()) {
                eligible.push(Arc::clone(c));
            }
        }
        eligible
    }

    /// Bring membership and conferenceables up to date
    pub fn recalculate(&mut self) -> Recalculation {
        let eligible = self.eligible();
        let (members, overflow) = eligible.split_at(eligible.len().min(self.max_size));
        let overflow: HashSet<ConnectionId> = overflow.iter().map(|c| c.id()).collect();

        let registered = self.routing.existing_connections();
        let outcome = if let Some(missing) = members.iter().find(|c| !registered.contains(&c.id())) {
            debug!("{} not registered with routing yet, deferring conference update", missing.id());
            self.recalculate_pending = true;
            Recalculation::Deferred
        } else {
            self.recalculate_pending = false;
            self.apply_membership(members);
            Recalculation::Applied
        };

        self.update_conferenceables(&overflow);
        outcome
    }

    fn apply_membership(&mut self, members: &[Arc<Connection>]) {
        if members.len() < 2 {
            if let Some(conference) = self.conference.take() {
                info!("GSM conference {} down to {} member(s), destroying", conference.id(), members.len());
                conference.destroy(DisconnectCause::Other);
                self.routing.remove_conference(conference.id());
            }
            return;
        }

        let (conference, created) = match &self.conference {
            Some(conference) => (Arc::clone(conference), false),
            None => {
                let conference = Arc::new(Conference::new(
                    RadioTechnology::Gsm,
                    Capabilities::SUPPORT_HOLD | Capabilities::HOLD | Capabilities::MUTE | Capabilities::MANAGE_CONFERENCE,
                ));
                info!("Creating GSM conference {}", conference.id());
                self.conference = Some(Arc::clone(&conference));
                (conference, true)
            }
        };

        let keep: HashSet<ConnectionId> = members.iter().map(|c| c.id()).collect();
        for existing in conference.member_ids() {
            if !keep.contains(&existing) {
                debug!("Removing {} from GSM conference {}", existing, conference.id());
                conference.remove_connection(existing);
            }
        }
        for member in members {
            if conference.add_connection(member) {
                debug!("Adding {} to GSM conference {}", member.id(), conference.id());
            }
        }
        if created {
            if let Some(primary) = conference.primary() {
                if let Some(time) = primary.connect_time() {
                    conference.set_connect_time(Some(time));
                }
            }
            self.routing.add_conference(Arc::clone(&conference));
        }

        if let Some(primary) = conference.primary() {
            match primary.state() {
                state @ (CallState::Active | CallState::Holding) => conference.set_state(state),
                _ => {}
            }
        }
    }

    fn update_conferenceables(&self, overflow: &HashSet<ConnectionId>) {
        let full = self.is_full();
        let excluded = |c: &Arc<Connection>| {
            overflow.contains(&c.id()) || (full && c.conference().is_some())
        };

        let mut active = Vec::new();
        let mut background = Vec::new();
        for c in &self.connections {
            if c.is_disconnected() || excluded(c) {
                continue;
            }
            match c.state() {
                CallState::Active => active.push(Conferenceable::Connection(c.id())),
                CallState::Holding => background.push(Conferenceable::Connection(c.id())),
                _ => {}
            }
        }

        for c in &self.connections {
            let with = if c.is_disconnected() || excluded(c) {
                Vec::new()
            } else {
                match c.state() {
                    CallState::Active => background.clone(),
                    CallState::Holding => active.clone(),
                    _ => Vec::new(),
                }
            };
            self.routing.set_conferenceable(Conferenceable::Connection(c.id()), with);
        }

        if let Some(conference) = &self.conference {
            let with = if full {
                Vec::new()
            } else {
                self.connections
                    .iter()
                    .filter(|c| c.conference().is_none() && !c.is_disconnected() && !excluded(*c))
                    .map(|c| Conferenceable::Connection(c.id()))
                    .collect()
            };
            self.routing.set_conferenceable(Conferenceable::Conference(conference.id()), with);
        }
    }
}
