//! Call legs
//!
//! A [`Connection`] is shared (`Arc`) between the routing layer and whichever
//! conference group currently tracks it. Its mutable part sits behind a
//! `parking_lot::RwLock`; getters take short read locks and never hold them
//! across calls into other objects.
//!
//! # Reported state
//!
//! The state the user sees is not always the state the radio reports. The
//! CDMA group can overlay two flags while it delays admission of a new
//! outgoing call:
//!
//! - `forced_dialing`: the new call reads as `Dialing`
//! - `held_for_conference`: an active call reads as `Holding`
//!
//! [`Connection::state`] applies the overlays, [`Connection::radio_state`]
//! does not.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::capabilities::{Capabilities, Properties};
use crate::conference::participant::ParticipantKey;
use crate::types::{
    CallDirection, CallState, ConferenceId, ConnectionId, DisconnectCause, RadioId,
    RadioTechnology,
};

/// What backs a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    /// A real call on a radio
    RadioLeg,
    /// A member of an IMS conference roster; no radio leg of its own
    Participant { key: ParticipantKey },
}

#[derive(Debug)]
struct ConnectionInner {
    state: CallState,
    radio: Option<RadioId>,
    technology: RadioTechnology,
    capabilities: Capabilities,
    properties: Properties,
    address: Option<String>,
    call_waiting: bool,
    multiparty: bool,
    conference_host: bool,
    forced_dialing: bool,
    held_for_conference: bool,
    connect_time: Option<DateTime<Utc>>,
    disconnect_cause: Option<DisconnectCause>,
    conference: Option<ConferenceId>,
}

/// A single call leg
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    direction: CallDirection,
    kind: ConnectionKind,
    inner: RwLock<ConnectionInner>,
}

impl Connection {
    /// New radio leg in state `New`
    pub fn new(direction: CallDirection, radio: Option<RadioId>, technology: RadioTechnology) -> Self {
        Self::with_kind(ConnectionKind::RadioLeg, direction, radio, technology)
    }

    /// Virtual IMS conference participant
    pub fn participant(key: ParticipantKey, radio: Option<RadioId>) -> Self {
        let address = key.handle.clone();
        let conn = Self::with_kind(
            ConnectionKind::Participant { key },
            CallDirection::Incoming,
            radio,
            RadioTechnology::Ims,
        );
        {
            let mut inner = conn.inner.write();
            inner.address = Some(address);
            inner.properties.insert(Properties::IS_PARTICIPANT);
        }
        conn
    }

    fn with_kind(
        kind: ConnectionKind,
        direction: CallDirection,
        radio: Option<RadioId>,
        technology: RadioTechnology,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            direction,
            kind,
            inner: RwLock::new(ConnectionInner {
                state: CallState::New,
                radio,
                technology,
                capabilities: Capabilities::empty(),
                properties: Properties::empty(),
                address: None,
                call_waiting: false,
                multiparty: false,
                conference_host: false,
                forced_dialing: false,
                held_for_conference: false,
                connect_time: None,
                disconnect_cause: None,
                conference: None,
            }),
        }
    }

    /// Builder: set the remote address
    pub fn with_address(self, address: impl Into<String>) -> Self {
        self.inner.write().address = Some(address.into());
        self
    }

    /// Builder: set the initial radio state
    pub fn with_state(self, state: CallState) -> Self {
        self.set_state(state);
        self
    }

    /// Wrap in an `Arc` for sharing with the routing layer
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Circuit-switched copy of an IMS conference host after SRVCC.
    ///
    /// Keeps direction, radio, address, state and connect time; carries the
    /// downgraded-conference marker permanently.
    pub fn clone_for_srvcc(&self, technology: RadioTechnology) -> Self {
        let src = self.inner.read();
        let mut capabilities = src.capabilities;
        capabilities.remove(Capabilities::MANAGE_CONFERENCE);
        capabilities.insert(Capabilities::CONFERENCE_HAS_NO_CHILDREN);
        let mut properties = src.properties;
        properties.remove(Properties::CONFERENCE_HOST);
        properties.insert(Properties::IS_DOWNGRADED_CONFERENCE);

        Self {
            id: ConnectionId::new(),
            direction: self.direction,
            kind: ConnectionKind::RadioLeg,
            inner: RwLock::new(ConnectionInner {
                state: src.state,
                radio: src.radio,
                technology,
                capabilities,
                properties,
                address: src.address.clone(),
                call_waiting: false,
                multiparty: src.multiparty,
                conference_host: false,
                forced_dialing: false,
                held_for_conference: false,
                connect_time: src.connect_time,
                disconnect_cause: None,
                conference: None,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == CallDirection::Outgoing
    }

    pub fn kind(&self) -> &ConnectionKind {
        &self.kind
    }

    pub fn is_participant(&self) -> bool {
        matches!(self.kind, ConnectionKind::Participant { .. })
    }

    /// State as presented to the user, overlays applied
    pub fn state(&self) -> CallState {
        let inner = self.inner.read();
        match inner.state {
            CallState::Disconnected => CallState::Disconnected,
            _ if inner.forced_dialing => CallState::Dialing,
            CallState::Active if inner.held_for_conference => CallState::Holding,
            state => state,
        }
    }

    /// State as reported by the radio
    pub fn radio_state(&self) -> CallState {
        self.inner.read().state
    }

    /// Radio-driven state change
    pub fn set_state(&self, state: CallState) {
        let mut inner = self.inner.write();
        if inner.state == state {
            return;
        }
        debug!("Connection {} state {} -> {}", self.id, inner.state, state);
        if state == CallState::Active && inner.connect_time.is_none() {
            inner.connect_time = Some(Utc::now());
        }
        inner.state = state;
    }

    pub fn set_disconnected(&self, cause: DisconnectCause) {
        let mut inner = self.inner.write();
        if inner.state == CallState::Disconnected {
            return;
        }
        debug!("Connection {} disconnected ({:?})", self.id, cause);
        inner.state = CallState::Disconnected;
        inner.disconnect_cause = Some(cause);
        inner.forced_dialing = false;
        inner.held_for_conference = false;
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.read().state == CallState::Disconnected
    }

    pub fn disconnect_cause(&self) -> Option<DisconnectCause> {
        self.inner.read().disconnect_cause
    }

    pub fn radio(&self) -> Option<RadioId> {
        self.inner.read().radio
    }

    pub fn set_radio(&self, radio: RadioId) {
        self.inner.write().radio = Some(radio);
    }

    pub fn technology(&self) -> RadioTechnology {
        self.inner.read().technology
    }

    pub fn set_technology(&self, technology: RadioTechnology) {
        self.inner.write().technology = technology;
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.read().capabilities
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.inner.write().capabilities = capabilities;
    }

    pub fn properties(&self) -> Properties {
        self.inner.read().properties
    }

    pub fn set_properties(&self, properties: Properties) {
        self.inner.write().properties = properties;
    }

    pub fn address(&self) -> Option<String> {
        self.inner.read().address.clone()
    }

    pub fn is_call_waiting(&self) -> bool {
        self.inner.read().call_waiting
    }

    pub fn set_call_waiting(&self, call_waiting: bool) {
        self.inner.write().call_waiting = call_waiting;
    }

    /// Whether the underlying radio call reports being part of a multiparty call
    pub fn is_multiparty(&self) -> bool {
        self.inner.read().multiparty
    }

    pub fn set_multiparty(&self, multiparty: bool) {
        self.inner.write().multiparty = multiparty;
    }

    /// Whether this IMS leg hosts a network conference
    pub fn is_conference_host(&self) -> bool {
        self.inner.read().conference_host
    }

    pub fn set_conference_host(&self, host: bool) {
        let mut inner = self.inner.write();
        inner.conference_host = host;
        inner.properties.set(Properties::CONFERENCE_HOST, host);
    }

    pub fn is_forced_dialing(&self) -> bool {
        self.inner.read().forced_dialing
    }

    pub fn set_forced_dialing(&self, forced: bool) {
        self.inner.write().forced_dialing = forced;
    }

    pub fn is_held_for_conference(&self) -> bool {
        self.inner.read().held_for_conference
    }

    pub fn set_held_for_conference(&self, held: bool) {
        self.inner.write().held_for_conference = held;
    }

    pub fn connect_time(&self) -> Option<DateTime<Utc>> {
        self.inner.read().connect_time
    }

    pub fn set_connect_time(&self, time: DateTime<Utc>) {
        self.inner.write().connect_time = Some(time);
    }

    /// Conference this connection currently belongs to
    pub fn conference(&self) -> Option<ConferenceId> {
        self.inner.read().conference
    }

    pub(crate) fn set_conference(&self, conference: Option<ConferenceId>) {
        self.inner.write().conference = conference;
    }
}
