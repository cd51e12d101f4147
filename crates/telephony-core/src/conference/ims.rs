//! Network-hosted (IMS) conference
//!
//! An [`ImsConferenceGroup`] wraps the *host* leg, the call to the
//! conference server, and mirrors the server's roster as virtual participant
//! connections. The roster arrives as a full list on every update; the group
//! diffs it against what it tracks.
//!
//! # Roster reconciliation
//!
//! One update runs entirely under the participant lock:
//!
//! 1. untracked entries (other than the host's own number) become new
//!    participants registered with routing under the conference
//! 2. tracked entries have their state refreshed
//! 3. new participants receive their initial state
//! 4. tracked participants missing from the roster are disconnected
//!    (`Canceled`, so they are not call-logged) and unregistered
//! 5. if the set changed, `MANAGE_CONFERENCE` is offered iff there are
//!    participants, `CONFERENCE_HAS_NO_CHILDREN` otherwise
//!
//! A roster entry that already reads Disconnected is never added, and a
//! tracked one that turns Disconnected is handled like an absent one.
//!
//! # SRVCC
//!
//! If the host leg is handed over to a circuit-switched radio, the network
//! conference is gone from the device's point of view. The host is cloned
//! into a plain circuit-switched call marked as a downgraded conference,
//! participants are dropped and the conference is destroyed.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capabilities::{Capabilities, Properties};
use crate::conference::participant::{numbers_match, ConferenceParticipant, ParticipantKey};
use crate::conference::Conference;
use crate::config::CarrierConfig;
use crate::connection::Connection;
use crate::error::{Result, TelephonyError};
use crate::radio::RadioRef;
use crate::routing::CallRouting;
use crate::types::{CallState, ConferenceId, ConnectionId, DisconnectCause, RadioTechnology};

/// What a roster update changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub added: Vec<ConnectionId>,
    pub updated: usize,
    pub removed: Vec<ConnectionId>,
}

impl RosterDiff {
    pub fn membership_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Outcome of re-reading the host leg
#[derive(Debug)]
pub enum HostUpdate {
    /// Host still on IMS; state and capabilities mirrored
    Mirrored,
    /// Host disconnected; conference torn down
    Ended,
    /// Host moved to a circuit-switched radio; the clone replaces it
    Srvcc(Arc<Connection>),
}

pub struct ImsConferenceGroup {
    conference: Arc<Conference>,
    host: RwLock<Option<Arc<Connection>>>,
    host_addresses: Vec<String>,
    carrier: CarrierConfig,
    radio: RadioRef,
    routing: Arc<dyn CallRouting>,
    participants: Mutex<HashMap<ParticipantKey, Arc<Connection>>>,
}

impl ImsConferenceGroup {
    /// Wrap `host` and register the conference with routing.
    ///
    /// `host_addresses` are the device's own numbers on the host's radio;
    /// roster entries matching them are the device itself.
    pub fn new(
        host: Arc<Connection>,
        host_addresses: Vec<String>,
        carrier: CarrierConfig,
        radio: RadioRef,
        routing: Arc<dyn CallRouting>,
    ) -> Arc<Self> {
        let mut capabilities = Capabilities::MUTE | Capabilities::CONFERENCE_HAS_NO_CHILDREN;
        if carrier.allow_hold_in_ims_call {
            capabilities |= Capabilities::SUPPORT_HOLD | Capabilities::HOLD;
        }
        let conference = Arc::new(Conference::new(RadioTechnology::Ims, capabilities));
        conference.update_properties(|props| props.insert(Properties::CONFERENCE_HOST));
        conference.set_connect_time(host.connect_time());
        host.set_conference(Some(conference.id()));

        let group = Arc::new(Self {
            conference,
            host: RwLock::new(Some(host)),
            host_addresses,
            carrier,
            radio,
            routing,
            participants: Mutex::new(HashMap::new()),
        });
        group.mirror_host();
        info!("IMS conference {} created", group.conference.id());
        group.routing.add_conference(Arc::clone(&group.conference));
        group
    }

    pub fn id(&self) -> ConferenceId {
        self.conference.id()
    }

    pub fn conference(&self) -> &Arc<Conference> {
        &self.conference
    }

    pub fn host(&self) -> Option<Arc<Connection>> {
        self.host.read().clone()
    }

    pub fn is_host(&self, id: ConnectionId) -> bool {
        self.host.read().as_ref().is_some_and(|h| h.id() == id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    pub fn participants(&self) -> Vec<Arc<Connection>> {
        self.participants.lock().values().cloned().collect()
    }

    /// Carrier size enforcement: no further merges once full
    pub fn is_full(&self) -> bool {
        self.carrier.size_enforced && self.participant_count() >= self.carrier.maximum_conference_size()
    }

    /// Process the roster the host reported before the group existed
    pub fn update_participants_after_creation(&self, roster: &[ConferenceParticipant]) -> RosterDiff {
        self.handle_roster_update(roster)
    }

    /// Reconcile tracked participants against a full roster
    pub fn handle_roster_update(&self, roster: &[ConferenceParticipant]) -> RosterDiff {
        if self.conference.is_destroyed() {
            debug!("Roster update for destroyed IMS conference {} ignored", self.id());
            return RosterDiff::default();
        }

        let mut participants = self.participants.lock();
        let mut diff = RosterDiff::default();
        let mut seen: HashSet<ParticipantKey> = HashSet::with_capacity(roster.len());
        let mut pending_state: Vec<(Arc<Connection>, CallState)> = Vec::new();
        let host = self.host();
        let radio_id = host.as_ref().and_then(|h| h.radio());
        let host_connect_time = host.as_ref().and_then(|h| h.connect_time());

        for entry in roster {
            let key = entry.key();
            if entry.state == CallState::Disconnected {
                continue;
            }
            seen.insert(key.clone());

            if let Some(existing) = participants.get(&key) {
                existing.set_state(entry.state);
                diff.updated += 1;
                continue;
            }
            if self.is_participant_host(&entry.handle) {
                continue;
            }

            let participant = Arc::new(Connection::participant(key.clone(), radio_id));
            if let Some(time) = host_connect_time {
                participant.set_connect_time(time);
            }
            debug!("IMS conference {} adding participant {}", self.id(), entry.handle);
            self.conference.add_connection(&participant);
            self.routing.add_connection(Arc::clone(&participant), Some(self.id()));
            diff.added.push(participant.id());
            pending_state.push((Arc::clone(&participant), entry.state));
            participants.insert(key, participant);
        }

        for (participant, state) in pending_state {
            participant.set_state(state);
        }

        let gone: Vec<ParticipantKey> = participants
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(participant) = participants.remove(&key) {
                debug!("IMS conference {} removing participant {}", self.id(), key.handle);
                participant.set_disconnected(DisconnectCause::Canceled);
                self.routing.remove_connection(participant.id());
                self.conference.remove_connection(participant.id());
                diff.removed.push(participant.id());
            }
        }

        if diff.membership_changed() {
            let has_participants = !participants.is_empty();
            self.conference.update_capabilities(|caps| {
                caps.set(Capabilities::MANAGE_CONFERENCE, has_participants);
                caps.set(Capabilities::CONFERENCE_HAS_NO_CHILDREN, !has_participants);
            });
            info!(
                "IMS conference {} roster: +{} -{} ({} participants)",
                self.id(),
                diff.added.len(),
                diff.removed.len(),
                participants.len()
            );
        }
        diff
    }

    fn is_participant_host(&self, handle: &str) -> bool {
        self.host_addresses.iter().any(|own| numbers_match(handle, own))
    }

    /// Re-read the host after it changed
    pub fn on_host_changed(&self) -> HostUpdate {
        let Some(host) = self.host() else {
            return HostUpdate::Ended;
        };

        if host.technology() != RadioTechnology::Ims {
            return HostUpdate::Srvcc(self.handover(&host));
        }

        if host.is_disconnected() {
            let cause = host.disconnect_cause().unwrap_or(DisconnectCause::Canceled);
            info!("IMS conference host {} disconnected, ending conference {}", host.id(), self.id());
            self.tear_down(cause);
            return HostUpdate::Ended;
        }

        self.mirror_host();
        HostUpdate::Mirrored
    }

    /// Host leg was dropped by its owner; end the conference
    pub fn host_removed(&self) {
        let host = self.host.write().take();
        let Some(host) = host else {
            return;
        };
        let cause = host.disconnect_cause().unwrap_or(DisconnectCause::Canceled);
        if host.conference() == Some(self.id()) {
            host.set_conference(None);
        }
        info!("IMS conference host {} removed, ending conference {}", host.id(), self.id());
        self.tear_down(cause);
    }

    /// Copy state, capabilities and properties from the host
    fn mirror_host(&self) {
        let Some(host) = self.host() else {
            return;
        };

        match host.state() {
            state @ (CallState::Dialing | CallState::Active | CallState::Holding) => {
                self.conference.set_state(state)
            }
            _ => {}
        }

        let host_caps = host.capabilities();
        let video_supported = self.carrier.video_conferencing_supported;
        self.conference.update_capabilities(|caps| {
            caps.mirror(
                host_caps,
                Capabilities::VIDEO_LOCAL_BIDIRECTIONAL | Capabilities::CANNOT_DOWNGRADE_VIDEO_TO_AUDIO,
            );
            if video_supported {
                caps.mirror(host_caps, Capabilities::VIDEO_REMOTE_MASK);
            } else {
                caps.remove(Capabilities::VIDEO_REMOTE_MASK);
            }
        });

        let host_props = host.properties();
        self.conference
            .update_properties(|props| props.mirror(host_props, Properties::HOST_MIRRORED));
    }

    /// SRVCC: replace the host with a circuit-switched clone
    fn handover(&self, host: &Arc<Connection>) -> Arc<Connection> {
        let technology = host.technology();
        let clone = Arc::new(host.clone_for_srvcc(technology));
        info!(
            "IMS conference {} host moved to {:?}, continuing as {}",
            self.id(),
            technology,
            clone.id()
        );

        self.routing.add_connection(Arc::clone(&clone), None);

        *self.host.write() = None;
        host.set_conference(None);
        host.set_disconnected(DisconnectCause::Other);
        self.tear_down(DisconnectCause::Other);
        clone
    }

    fn disconnect_participants(&self) {
        let mut participants = self.participants.lock();
        for (_, participant) in participants.drain() {
            participant.set_disconnected(DisconnectCause::Canceled);
            self.routing.remove_connection(participant.id());
            self.conference.remove_connection(participant.id());
        }
    }

    fn tear_down(&self, cause: DisconnectCause) {
        self.disconnect_participants();
        self.conference.set_disconnected(cause);
        self.conference.destroy(cause);
        self.routing.remove_conference(self.id());
    }

    /// User hung up the conference
    pub fn disconnect(&self) -> Result<()> {
        self.disconnect_participants();
        let Some(host) = self.host() else {
            return Ok(());
        };
        self.radio.hangup(&host).inspect_err(|e| {
            warn!("Hangup of IMS conference host {} failed: {}", host.id(), e);
        })
    }

    /// Ask the network to merge the current calls into this conference
    pub fn merge(&self) -> Result<()> {
        if self.is_full() {
            return Err(TelephonyError::InvalidState(format!("IMS conference {} is full", self.id())));
        }
        self.radio.conference()
    }

    pub fn separate(&self) -> Result<()> {
        Err(TelephonyError::Unsupported("separate from IMS conference".to_string()))
    }
}
