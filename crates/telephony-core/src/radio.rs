//! Radio abstraction
//!
//! The modem is an external collaborator. The crate only reads its state and
//! issues a handful of commands, all through the [`Radio`] trait. Commands
//! are fire-and-forget from the crate's point of view; results that matter
//! (service coming up) arrive through [`Radio::subscribe_service_state`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::connection::Connection;
use crate::error::Result;
use crate::types::{RadioId, RadioTechnology};

/// Network registration state of a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    InService,
    OutOfService,
    /// Only emergency calls are possible
    EmergencyOnly,
    PowerOff,
}

impl ServiceState {
    /// In service or emergency-only
    pub fn can_place_emergency_call(&self) -> bool {
        matches!(self, ServiceState::InService | ServiceState::EmergencyOnly)
    }
}

/// SIM card state as seen by a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimState {
    Absent,
    Ready,
    PinRequired,
    PukRequired,
    NetworkLocked,
    Unknown,
}

impl SimState {
    /// PIN or PUK locked
    pub fn is_locked(&self) -> bool {
        matches!(self, SimState::PinRequired | SimState::PukRequired)
    }
}

/// Radio access family bitmask
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RadioAccessFamily(pub u32);

impl RadioAccessFamily {
    pub const GPRS: RadioAccessFamily = RadioAccessFamily(1 << 0);
    pub const EDGE: RadioAccessFamily = RadioAccessFamily(1 << 1);
    pub const GSM: RadioAccessFamily = RadioAccessFamily(1 << 2);
    pub const IS95A: RadioAccessFamily = RadioAccessFamily(1 << 3);
    pub const IS95B: RadioAccessFamily = RadioAccessFamily(1 << 4);
    pub const ONE_X_RTT: RadioAccessFamily = RadioAccessFamily(1 << 5);
    pub const UMTS: RadioAccessFamily = RadioAccessFamily(1 << 6);
    pub const HSDPA: RadioAccessFamily = RadioAccessFamily(1 << 7);
    pub const HSUPA: RadioAccessFamily = RadioAccessFamily(1 << 8);
    pub const HSPA: RadioAccessFamily = RadioAccessFamily(1 << 9);
    pub const EVDO_0: RadioAccessFamily = RadioAccessFamily(1 << 10);
    pub const TD_SCDMA: RadioAccessFamily = RadioAccessFamily(1 << 11);
    pub const LTE: RadioAccessFamily = RadioAccessFamily(1 << 12);
    pub const LTE_CA: RadioAccessFamily = RadioAccessFamily(1 << 13);
    pub const NR: RadioAccessFamily = RadioAccessFamily(1 << 14);

    const GEN_2G: u32 = Self::GPRS.0 | Self::EDGE.0 | Self::GSM.0 | Self::IS95A.0
        | Self::IS95B.0 | Self::ONE_X_RTT.0;
    const GEN_3G: u32 = Self::UMTS.0 | Self::HSDPA.0 | Self::HSUPA.0 | Self::HSPA.0
        | Self::EVDO_0.0 | Self::TD_SCDMA.0;
    const GEN_4G: u32 = Self::LTE.0 | Self::LTE_CA.0;
    const GEN_5G: u32 = Self::NR.0;

    pub fn bit_count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Strongest generation supported: 0 (none) through 4 (5G)
    pub fn highest_generation(&self) -> u8 {
        if self.0 & Self::GEN_5G != 0 {
            4
        } else if self.0 & Self::GEN_4G != 0 {
            3
        } else if self.0 & Self::GEN_3G != 0 {
            2
        } else if self.0 & Self::GEN_2G != 0 {
            1
        } else {
            0
        }
    }
}

impl std::ops::BitOr for RadioAccessFamily {
    type Output = RadioAccessFamily;

    fn bitor(self, rhs: RadioAccessFamily) -> RadioAccessFamily {
        RadioAccessFamily(self.0 | rhs.0)
    }
}

impl fmt::Debug for RadioAccessFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RadioAccessFamily({:#x})", self.0)
    }
}

/// A single modem/radio serving one SIM slot
pub trait Radio: Send + Sync {
    fn id(&self) -> RadioId;

    fn service_state(&self) -> ServiceState;

    /// Whether the service state tracker reports the radio powered on
    fn is_radio_on(&self) -> bool;

    /// Whether a call is currently off-hook on this radio
    fn is_off_hook(&self) -> bool;

    fn sim_state(&self) -> SimState;

    /// Whether a SIM card is physically present
    fn has_icc_card(&self) -> bool;

    fn radio_access_family(&self) -> RadioAccessFamily;

    /// Technology new voice calls on this radio use
    fn voice_technology(&self) -> RadioTechnology;

    fn set_radio_power(&self, on: bool);

    /// Service state changes, delivered after they happen
    fn subscribe_service_state(&self) -> broadcast::Receiver<ServiceState>;

    fn dial(&self, connection: &Connection) -> Result<()>;

    fn hangup(&self, connection: &Connection) -> Result<()>;

    /// CDMA flash: toggle between the active and held leg
    fn switch_holding_and_active(&self) -> Result<()>;

    /// Ask the network to conference the current calls
    fn conference(&self) -> Result<()>;
}

/// Shared handle to a radio
pub type RadioRef = Arc<dyn Radio>;

/// Device-wide settings the emergency path may flip
pub trait DeviceSettings: Send + Sync {
    fn is_airplane_mode_on(&self) -> bool;

    fn set_airplane_mode(&self, on: bool);
}
