//! CDMA conference policy
//!
//! CDMA has a single radio call; "conferencing" is a flash command the
//! network never acknowledges. The group therefore keeps one conference as
//! soon as two usable legs exist and offers exactly one of:
//!
//! - `MERGE_CONFERENCE` when the newest leg is outgoing (flash merges it in)
//! - `SWAP_CONFERENCE` when the newest leg is incoming (flash toggles legs)
//!
//! A merge is assumed to succeed once the flash is sent; `MERGE_CONFERENCE`
//! is cleared after the first accepted flash and a repeated merge does
//! nothing. A flash the radio refuses leaves the merge available.
//!
//! # Delayed admission
//!
//! A new outgoing leg added while another leg exists is not admitted right
//! away. For `cdma_admission_delay` it reads as Dialing and every active leg
//! reads as Holding; only then does it join the group and the overlays drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capabilities::Capabilities;
use crate::conference::service::ConferenceEvent;
use crate::conference::Conference;
use crate::connection::Connection;
use crate::error::{Result, TelephonyError};
use crate::radio::RadioRef;
use crate::routing::CallRouting;
use crate::timer::GenerationTimer;
use crate::types::{CallState, ConferenceId, ConnectionId, DisconnectCause, RadioId, RadioTechnology};

pub struct CdmaConferenceGroup {
    routing: Arc<dyn CallRouting>,
    radios: HashMap<RadioId, RadioRef>,
    admission_delay: Duration,
    connections: Vec<Arc<Connection>>,
    pending: Option<Arc<Connection>>,
    conference: Option<Arc<Conference>>,
    /// Newest member when the MERGE/SWAP capability was last granted
    capability_anchor: Option<ConnectionId>,
    admission_timer: GenerationTimer,
    event_tx: mpsc::UnboundedSender<ConferenceEvent>,
}

impl CdmaConferenceGroup {
    pub fn new(
        routing: Arc<dyn CallRouting>,
        radios: HashMap<RadioId, RadioRef>,
        admission_delay: Duration,
        event_tx: mpsc::UnboundedSender<ConferenceEvent>,
    ) -> Self {
        Self {
            routing,
            radios,
            admission_delay,
            connections: Vec::new(),
            pending: None,
            conference: None,
            capability_anchor: None,
            admission_timer: GenerationTimer::new(),
            event_tx,
        }
    }

    pub fn add(&mut self, connection: Arc<Connection>) {
        if self.tracks(connection.id()) {
            return;
        }

        let others = self.connections.iter().any(|c| !c.is_disconnected());
        if connection.is_outgoing() && others {
            if let Some(previous) = self.pending.take() {
                self.admit(previous);
            }
            info!(
                "Delaying admission of outgoing CDMA call {} for {:?}",
                connection.id(),
                self.admission_delay
            );
            connection.set_forced_dialing(true);
            for c in &self.connections {
                if c.radio_state() == CallState::Active {
                    c.set_held_for_conference(true);
                }
            }
            self.pending = Some(connection);
            self.admission_timer.arm(self.admission_delay, self.event_tx.clone(), |generation| {
                ConferenceEvent::CdmaAdmissionTimeout { generation }
            });
            return;
        }

        self.connections.push(connection);
        self.recalculate();
    }

    /// Admission delay elapsed
    pub fn on_admission_timeout(&mut self, generation: u64) {
        if !self.admission_timer.fire(generation) {
            debug!("Stale CDMA admission timer ({}) ignored", generation);
            return;
        }
        if let Some(pending) = self.pending.take() {
            self.admit(pending);
            self.recalculate();
        }
    }

    fn admit(&mut self, connection: Arc<Connection>) {
        debug!("Admitting CDMA call {}", connection.id());
        connection.set_forced_dialing(false);
        for c in &self.connections {
            c.set_held_for_conference(false);
        }
        self.connections.push(connection);
    }

    pub fn remove(&mut self, id: ConnectionId) {
        if self.pending.as_ref().is_some_and(|p| p.id() == id) {
            self.admission_timer.cancel();
            if let Some(pending) = self.pending.take() {
                pending.set_forced_dialing(false);
            }
            for c in &self.connections {
                c.set_held_for_conference(false);
            }
        }
        self.connections.retain(|c| c.id() != id);
        if let Some(conference) = &self.conference {
            conference.remove_connection(id);
        }
        self.recalculate();
    }

    pub fn tracks(&self, id: ConnectionId) -> bool {
        self.pending.as_ref().is_some_and(|p| p.id() == id) || self.connections.iter().any(|c| c.id() == id)
    }

    pub fn conference(&self) -> Option<&Arc<Conference>> {
        self.conference.as_ref()
    }

    pub fn is_admission_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Re-evaluate membership after any leg changed
    pub fn recalculate(&mut self) {
        let valid: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .filter(|c| !c.is_call_waiting() && !c.is_disconnected())
            .cloned()
            .collect();

        if valid.len() < 2 {
            self.destroy_conference();
            return;
        }

        let conference = match &self.conference {
            Some(conference) => Arc::clone(conference),
            None => {
                let conference = Arc::new(Conference::new(
                    RadioTechnology::Cdma,
                    Capabilities::MUTE | Capabilities::HOLD | Capabilities::SUPPORT_HOLD,
                ));
                info!("Creating CDMA conference {}", conference.id());
                for c in &valid {
                    conference.add_connection(c);
                }
                self.conference = Some(Arc::clone(&conference));
                self.routing.add_conference(Arc::clone(&conference));
                conference
            }
        };

        for existing in conference.member_ids() {
            if !valid.iter().any(|c| c.id() == existing) {
                conference.remove_connection(existing);
            }
        }
        for c in &valid {
            conference.add_connection(c);
        }

        // Grant MERGE or SWAP once per newest leg.
        if let Some(newest) = valid.last() {
            if self.capability_anchor != Some(newest.id()) {
                self.capability_anchor = Some(newest.id());
                let merge = newest.is_outgoing();
                conference.update_capabilities(|caps| {
                    caps.set(Capabilities::MERGE_CONFERENCE, merge);
                    caps.set(Capabilities::SWAP_CONFERENCE, !merge);
                });
                debug!(
                    "CDMA conference {} grants {}",
                    conference.id(),
                    if merge { "MERGE" } else { "SWAP" }
                );
            }
        }

        let state = if valid.iter().any(|c| c.state() == CallState::Active) {
            CallState::Active
        } else {
            CallState::Holding
        };
        conference.set_state(state);
    }

    fn destroy_conference(&mut self) {
        if let Some(conference) = self.conference.take() {
            info!("CDMA conference {} below two legs, destroying", conference.id());
            conference.destroy(DisconnectCause::Other);
            self.routing.remove_conference(conference.id());
        }
        self.capability_anchor = None;
    }

    /// Merge the calls with one flash. A second merge is a no-op.
    ///
    /// Returns whether a flash was sent.
    pub fn merge(&mut self, id: ConferenceId) -> Result<bool> {
        let conference = self.conference_by_id(id)?;
        if !conference.capabilities().contains(Capabilities::MERGE_CONFERENCE) {
            debug!("CDMA conference {} already merged", id);
            return Ok(false);
        }
        self.flash(&conference)?;
        conference.update_capabilities(|caps| caps.remove(Capabilities::MERGE_CONFERENCE));
        Ok(true)
    }

    /// Toggle between the two legs. Returns whether a flash was sent.
    pub fn swap(&mut self, id: ConferenceId) -> Result<bool> {
        let conference = self.conference_by_id(id)?;
        if !conference.capabilities().contains(Capabilities::SWAP_CONFERENCE) {
            return Ok(false);
        }
        self.flash(&conference)?;
        Ok(true)
    }

    /// An unmerged CDMA conference blocks a further outgoing call
    pub fn can_add_outgoing_call(&self) -> bool {
        self.conference
            .as_ref()
            .is_none_or(|c| !c.capabilities().contains(Capabilities::MERGE_CONFERENCE))
    }

    fn conference_by_id(&self, id: ConferenceId) -> Result<Arc<Conference>> {
        self.conference
            .as_ref()
            .filter(|c| c.id() == id)
            .cloned()
            .ok_or(TelephonyError::ConferenceNotFound(id))
    }

    fn flash(&self, conference: &Conference) -> Result<()> {
        let radio_id = conference
            .primary()
            .and_then(|c| c.radio())
            .ok_or_else(|| TelephonyError::InvalidState(format!("conference {} has no radio", conference.id())))?;
        let radio = self
            .radios
            .get(&radio_id)
            .ok_or(TelephonyError::RadioNotFound(radio_id))?;
        info!("Sending CDMA flash on {} for conference {}", radio_id, conference.id());
        radio.switch_holding_and_active().inspect_err(|e| {
            warn!("CDMA flash failed on {}: {}", radio_id, e);
        })
    }
}
