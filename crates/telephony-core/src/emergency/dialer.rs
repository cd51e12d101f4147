//! Emergency call placement
//!
//! Gates an outgoing emergency call on radio readiness, picks the radio with
//! [`PhoneSelector`] and dials. A failed attempt can be retried on the next
//! radio in the selector's order with [`EmergencyDialer::redial`].

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::emergency::fanout::EmergencyFanoutCoordinator;
use crate::emergency::retry::is_ok_to_call;
use crate::emergency::selector::{PhoneSelector, RadioSnapshot, RedialCache};
use crate::error::{Result, TelephonyError};
use crate::radio::{DeviceSettings, RadioRef};
use crate::types::{CallState, DisconnectCause, RadioId};

pub struct EmergencyDialer {
    radios: Vec<RadioRef>,
    settings: Arc<dyn DeviceSettings>,
    fanout: EmergencyFanoutCoordinator,
    selector: PhoneSelector,
    redial: Mutex<RedialCache>,
}

impl EmergencyDialer {
    pub fn new(
        radios: Vec<RadioRef>,
        settings: Arc<dyn DeviceSettings>,
        fanout: EmergencyFanoutCoordinator,
        selector: PhoneSelector,
    ) -> Self {
        Self {
            radios,
            settings,
            fanout,
            selector,
            redial: Mutex::new(RedialCache::new()),
        }
    }

    /// Whether radios have to be brought up before dialing
    pub fn needs_radio_on(&self) -> bool {
        self.settings.is_airplane_mode_on() || !self.radios.iter().any(|r| r.is_radio_on())
    }

    pub fn rank(&self) -> Vec<RadioId> {
        self.selector.rank(&self.snapshots())
    }

    /// Place `connection` as an emergency call.
    ///
    /// Brings radios up first if needed. If that fails the connection is
    /// disconnected with [`DisconnectCause::PowerOff`]. A connection the user
    /// hung up while waiting is left alone.
    pub async fn place_emergency_call(&self, connection: &Arc<Connection>) -> Result<RadioId> {
        if self.needs_radio_on() {
            info!("Radio off for emergency call {}, enabling radios", connection.id());
            let ready = self.fanout.enable_emergency_calling_async().await;
            if !ready {
                warn!("Failed to turn on radio for emergency call {}", connection.id());
                connection.set_disconnected(DisconnectCause::PowerOff);
                return Err(TelephonyError::RadioUnavailable {
                    cause: DisconnectCause::PowerOff,
                });
            }
        }

        if connection.is_disconnected() {
            return Err(TelephonyError::InvalidState(format!(
                "connection {} disconnected before radio was ready",
                connection.id()
            )));
        }

        let radio_id = self
            .selector
            .select(&self.snapshots(), &[])
            .ok_or(TelephonyError::NoRadioAvailable(connection.id()))?;
        self.dial_on(connection, radio_id)?;
        Ok(radio_id)
    }

    /// Retry `connection` on the next radio after `failed`.
    ///
    /// Disconnects with [`DisconnectCause::Error`] once every radio was tried.
    pub fn redial(&self, connection: &Arc<Connection>, failed: RadioId) -> Result<RadioId> {
        let next = self
            .redial
            .lock()
            .phone_for_redial(connection.id(), failed, || self.rank());

        let Some(radio_id) = next else {
            connection.set_disconnected(DisconnectCause::Error);
            return Err(TelephonyError::NoRadioAvailable(connection.id()));
        };
        self.dial_on(connection, radio_id)?;
        Ok(radio_id)
    }

    /// Forget redial state for a finished call
    pub fn call_ended(&self, connection: &Connection) {
        self.redial.lock().clear(connection.id());
    }

    fn dial_on(&self, connection: &Arc<Connection>, radio_id: RadioId) -> Result<()> {
        let radio = self
            .radios
            .iter()
            .find(|r| r.id() == radio_id)
            .ok_or(TelephonyError::RadioNotFound(radio_id))?;
        if !is_ok_to_call(radio.as_ref()) {
            warn!("{} is off, not dialing emergency call {}", radio_id, connection.id());
            return Err(TelephonyError::RadioCommand {
                radio: radio_id,
                reason: "radio is powered off".to_string(),
            });
        }

        connection.set_radio(radio_id);
        connection.set_technology(radio.voice_technology());
        radio.dial(connection)?;
        connection.set_state(CallState::Dialing);
        info!("Emergency call {} dialing on {}", connection.id(), radio_id);
        Ok(())
    }

    fn snapshots(&self) -> Vec<RadioSnapshot> {
        self.radios
            .iter()
            .map(|r| RadioSnapshot::capture(r.as_ref()))
            .collect()
    }
}
