//! Core types for telephony-core
//!
//! Identifiers, call states and the small enums shared by the conference
//! groups and the emergency subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Connection identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conference identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConferenceId(pub Uuid);

impl ConferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conf-{}", self.0)
    }
}

/// Radio identifier: the SIM slot index the radio serves
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RadioId(pub usize);

impl RadioId {
    pub fn slot(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RadioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "radio-{}", self.0)
    }
}

/// Call leg state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    New,
    Dialing,
    Ringing,
    Active,
    Holding,
    Disconnected,
}

impl CallState {
    /// Active or Holding
    pub fn is_established(&self) -> bool {
        matches!(self, CallState::Active | CallState::Holding)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::New => "New",
            CallState::Dialing => "Dialing",
            CallState::Ringing => "Ringing",
            CallState::Active => "Active",
            CallState::Holding => "Holding",
            CallState::Disconnected => "Disconnected",
        };
        write!(f, "{}", s)
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Radio technology carrying a call leg.
///
/// Carried alongside a single [`Connection`](crate::connection::Connection)
/// type; SRVCC changes it from `Ims` to `Gsm` in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioTechnology {
    Gsm,
    Cdma,
    Ims,
}

impl RadioTechnology {
    pub fn is_circuit_switched(&self) -> bool {
        !matches!(self, RadioTechnology::Ims)
    }
}

/// Why a connection or conference was disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectCause {
    /// Normal local hangup
    Local,
    /// Normal remote hangup
    Remote,
    /// Removed without being call-logged (roster departures, teardown)
    Canceled,
    /// Outgoing attempt abandoned before it connected
    OutgoingCanceled,
    /// Radio could not be powered on
    PowerOff,
    /// Outgoing call blocked by the current call set
    Restricted,
    /// Placement failed
    Error,
    /// Anything else, including SRVCC teardown
    Other,
}

impl DisconnectCause {
    /// Whether the disconnect should appear in the call log
    pub fn is_logged(&self) -> bool {
        !matches!(self, DisconnectCause::Canceled)
    }
}
