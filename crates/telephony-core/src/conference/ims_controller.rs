//! Tracks IMS legs and the network conferences they host
//!
//! IMS legs never form a conference locally; the network does. This
//! controller only keeps the conferenceable sets current and, when a leg
//! starts reporting that it hosts a conference, wraps it in an
//! [`ImsConferenceGroup`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conference::ims::{HostUpdate, ImsConferenceGroup};
use crate::conference::participant::ConferenceParticipant;
use crate::config::CarrierConfig;
use crate::connection::Connection;
use crate::radio::RadioRef;
use crate::routing::{CallRouting, Conferenceable};
use crate::types::{ConferenceId, ConnectionId, RadioId};

pub struct ImsConferenceController {
    routing: Arc<dyn CallRouting>,
    radios: HashMap<RadioId, RadioRef>,
    own_numbers: HashMap<RadioId, Vec<String>>,
    carrier: CarrierConfig,
    connections: Vec<Arc<Connection>>,
    groups: Vec<Arc<ImsConferenceGroup>>,
}

impl ImsConferenceController {
    pub fn new(
        routing: Arc<dyn CallRouting>,
        radios: HashMap<RadioId, RadioRef>,
        own_numbers: HashMap<RadioId, Vec<String>>,
        carrier: CarrierConfig,
    ) -> Self {
        Self {
            routing,
            radios,
            own_numbers,
            carrier,
            connections: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn add(&mut self, connection: Arc<Connection>) {
        if !self.tracks(connection.id()) {
            debug!("IMS controller tracking {}", connection.id());
            self.connections.push(connection);
        }
        self.on_connection_changed();
    }

    pub fn remove(&mut self, id: ConnectionId) {
        self.connections.retain(|c| c.id() != id);
        self.recalculate_conferenceables();
    }

    pub fn tracks(&self, id: ConnectionId) -> bool {
        self.connections.iter().any(|c| c.id() == id)
    }

    pub fn groups(&self) -> &[Arc<ImsConferenceGroup>] {
        &self.groups
    }

    pub fn group_for_host(&self, host: ConnectionId) -> Option<&Arc<ImsConferenceGroup>> {
        self.groups.iter().find(|g| g.is_host(host))
    }

    pub fn group(&self, id: ConferenceId) -> Option<&Arc<ImsConferenceGroup>> {
        self.groups.iter().find(|g| g.id() == id)
    }

    /// A tracked leg changed; promote new conference hosts
    pub fn on_connection_changed(&mut self) {
        let new_hosts: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .filter(|c| c.is_conference_host() && !c.is_disconnected())
            .cloned()
            .collect();
        for host in new_hosts {
            self.start_conference(host);
        }
        self.recalculate_conferenceables();
    }

    fn start_conference(&mut self, host: Arc<Connection>) {
        let Some(radio_id) = host.radio() else {
            warn!("IMS conference host {} has no radio", host.id());
            return;
        };
        let Some(radio) = self.radios.get(&radio_id).cloned() else {
            warn!("IMS conference host {} on unknown {}", host.id(), radio_id);
            return;
        };

        self.connections.retain(|c| c.id() != host.id());
        self.routing.remove_connection(host.id());

        let own_numbers = self.own_numbers.get(&radio_id).cloned().unwrap_or_default();
        let group = ImsConferenceGroup::new(
            Arc::clone(&host),
            own_numbers,
            self.carrier.clone(),
            radio,
            Arc::clone(&self.routing),
        );
        info!("Connection {} now hosts IMS conference {}", host.id(), group.id());
        self.groups.push(group);
    }

    /// Forward a roster; returns false if no conference has that host
    pub fn on_roster_update(&self, host: ConnectionId, roster: &[ConferenceParticipant]) -> bool {
        match self.group_for_host(host) {
            Some(group) => {
                if group.handle_roster_update(roster).membership_changed() {
                    self.recalculate_conferenceables();
                }
                true
            }
            None => false,
        }
    }

    /// Host leg changed. Returns the SRVCC clone, if the host left IMS.
    pub fn on_host_changed(&mut self, host: ConnectionId) -> Option<Arc<Connection>> {
        let group = Arc::clone(self.group_for_host(host)?);
        let outcome = group.on_host_changed();
        let clone = match outcome {
            HostUpdate::Mirrored => None,
            HostUpdate::Ended => None,
            HostUpdate::Srvcc(clone) => Some(clone),
        };
        self.groups.retain(|g| !g.conference().is_destroyed());
        self.recalculate_conferenceables();
        clone
    }

    /// Host leg removed. Returns false if `host` hosts no conference.
    pub fn on_host_removed(&mut self, host: ConnectionId) -> bool {
        let Some(group) = self.group_for_host(host).cloned() else {
            return false;
        };
        group.host_removed();
        self.groups.retain(|g| !g.conference().is_destroyed());
        self.recalculate_conferenceables();
        true
    }

    fn recalculate_conferenceables(&self) {
        let candidates: Vec<&Arc<Connection>> = self
            .connections
            .iter()
            .filter(|c| !c.is_disconnected() && c.conference().is_none() && c.state().is_established())
            .collect();
        let open_groups: Vec<&Arc<ImsConferenceGroup>> = self
            .groups
            .iter()
            .filter(|g| !g.conference().is_destroyed() && !g.is_full())
            .collect();

        for c in &self.connections {
            let with = if candidates.iter().any(|cand| cand.id() == c.id()) {
                candidates
                    .iter()
                    .filter(|other| other.id() != c.id())
                    .map(|other| Conferenceable::Connection(other.id()))
                    .chain(open_groups.iter().map(|g| Conferenceable::Conference(g.id())))
                    .collect()
            } else {
                Vec::new()
            };
            self.routing.set_conferenceable(Conferenceable::Connection(c.id()), with);
        }

        for group in &self.groups {
            if group.conference().is_destroyed() {
                continue;
            }
            let with = if group.is_full() {
                Vec::new()
            } else {
                candidates
                    .iter()
                    .map(|c| Conferenceable::Connection(c.id()))
                    .collect()
            };
            self.routing.set_conferenceable(Conferenceable::Conference(group.id()), with);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRadio, RecordingRouting};
    use crate::types::{CallDirection, CallState, RadioTechnology};

    fn controller(carrier: CarrierConfig) -> (ImsConferenceController, Arc<RecordingRouting>) {
        let routing = RecordingRouting::new();
        let radios = HashMap::from([(RadioId(0), FakeRadio::new(0) as RadioRef)]);
        let numbers = HashMap::from([(RadioId(0), vec!["tel:6505550000".to_string()])]);
        (ImsConferenceController::new(routing.clone(), radios, numbers, carrier), routing)
    }

    fn ims_leg(state: CallState) -> Arc<Connection> {
        Connection::new(CallDirection::Outgoing, Some(RadioId(0)), RadioTechnology::Ims)
            .with_state(state)
            .into_shared()
    }

    #[test]
    fn test_active_and_held_legs_pair() {
        let (mut controller, routing) = controller(CarrierConfig::default());
        let a = ims_leg(CallState::Active);
        let b = ims_leg(CallState::Holding);
        let dialing = ims_leg(CallState::Dialing);
        controller.add(a.clone());
        controller.add(b.clone());
        controller.add(dialing.clone());

        let for_a = routing.conferenceable_with(Conferenceable::Connection(a.id()));
        assert!(for_a.contains(&Conferenceable::Connection(b.id())));
        assert!(!for_a.contains(&Conferenceable::Connection(dialing.id())));
        assert!(routing.conferenceable_with(Conferenceable::Connection(dialing.id())).is_empty());
    }

    #[test]
    fn test_host_promoted_to_conference() {
        let (mut controller, routing) = controller(CarrierConfig::default());
        let host = ims_leg(CallState::Active);
        let other = ims_leg(CallState::Holding);
        controller.add(host.clone());
        controller.add(other.clone());

        host.set_conference_host(true);
        controller.on_connection_changed();

        assert_eq!(controller.groups().len(), 1);
        assert!(!controller.tracks(host.id()));
        let group = controller.group_for_host(host.id()).unwrap().clone();
        assert!(routing.removed_connections.lock().contains(&host.id()));
        assert!(routing
            .conferenceable_with(Conferenceable::Connection(other.id()))
            .contains(&Conferenceable::Conference(group.id())));

        assert!(controller.on_roster_update(host.id(), &[ConferenceParticipant::new(
            "tel:5551111",
            "ep",
            CallState::Active
        )]));
        assert_eq!(group.participant_count(), 1);
        assert!(!controller.on_roster_update(other.id(), &[]));
    }

    #[test]
    fn test_full_conference_not_conferenceable() {
        let (mut controller, routing) = controller(CarrierConfig::enforced(1));
        let host = ims_leg(CallState::Active);
        let other = ims_leg(CallState::Holding);
        host.set_conference_host(true);
        controller.add(host.clone());
        controller.add(other.clone());
        let group = controller.group_for_host(host.id()).unwrap().clone();

        controller.on_roster_update(host.id(), &[ConferenceParticipant::new("tel:5551111", "ep", CallState::Active)]);
        controller.on_connection_changed();
        assert!(group.is_full());
        assert!(routing.conferenceable_with(Conferenceable::Conference(group.id())).is_empty());
        assert!(!routing
            .conferenceable_with(Conferenceable::Connection(other.id()))
            .contains(&Conferenceable::Conference(group.id())));
    }

    #[test]
    fn test_removed_host_drops_group() {
        let (mut controller, routing) = controller(CarrierConfig::default());
        let host = ims_leg(CallState::Active);
        let other = ims_leg(CallState::Holding);
        host.set_conference_host(true);
        controller.add(host.clone());
        controller.add(other.clone());
        let group = controller.group_for_host(host.id()).unwrap().clone();

        assert!(controller.on_host_removed(host.id()));
        assert!(controller.groups().is_empty());
        assert!(group.conference().is_destroyed());
        assert!(!routing
            .conferenceable_with(Conferenceable::Connection(other.id()))
            .contains(&Conferenceable::Conference(group.id())));
        assert!(!controller.on_host_removed(host.id()));
    }

    #[test]
    fn test_srvcc_returns_clone_and_drops_group() {
        let (mut controller, _) = controller(CarrierConfig::default());
        let host = ims_leg(CallState::Active);
        host.set_conference_host(true);
        controller.add(host.clone());

        host.set_technology(RadioTechnology::Gsm);
        let clone = controller.on_host_changed(host.id()).unwrap();
        assert_eq!(clone.technology(), RadioTechnology::Gsm);
        assert!(controller.groups().is_empty());
    }
}
