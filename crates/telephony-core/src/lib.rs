//! # Telephony Core
//!
//! Call-grouping and emergency-calling logic for a multi-radio phone.
//!
//! ## Features
//!
//! - **Conference grouping**: per-technology policies that decide which legs
//!   form a conference and which legs may be merged (CDMA flash conferences,
//!   GSM multiparty conferences, network-hosted IMS conferences with roster
//!   reconciliation and SRVCC handover)
//! - **Emergency radio-on**: a per-radio retry controller that powers a radio
//!   on and waits for usable service, and a coordinator that fans the
//!   sequence out over every radio and reports one result
//! - **Radio selection**: a deterministic ranking of radios for emergency
//!   dialing, plus redial bookkeeping when a radio rejects the call
//!
//! ## Architecture
//!
//! - `radio` and `routing`: the traits the host platform implements
//! - `connection` and `conference`: shared call-leg and conference objects
//! - `conference::service`: the event loop that owns every grouping policy
//! - `emergency`: retry controller, fan-out, selector and dialer
//! - `config` and `logging`: TOML configuration and `tracing` setup
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use telephony_core::prelude::*;
//!
//! # async fn example(radios: Vec<RadioRef>, routing: Arc<dyn CallRouting>) -> Result<()> {
//! let config = TelephonyConfig::default();
//! setup_logging(LoggingConfig::from_config(&config)?)?;
//!
//! let conferences = ConferenceService::new(&config, radios, HashMap::new(), routing);
//! for conference in conferences.conferences().await? {
//!     println!("{} has {} legs", conference.id(), conference.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod conference;
pub mod config;
pub mod connection;
pub mod emergency;
pub mod error;
pub mod logging;
pub mod radio;
pub mod routing;
pub mod timer;
pub mod types;

#[cfg(test)]
mod test_support;

pub use capabilities::{Capabilities, Properties};
pub use conference::service::{ConferenceEvent, ConferenceService};
pub use conference::Conference;
pub use config::{CarrierConfig, ConferencePolicy, RetryPolicy, TelephonyConfig};
pub use connection::Connection;
pub use error::{Result, TelephonyError};
pub use logging::{setup_logging, LoggingConfig};
pub use radio::{DeviceSettings, Radio, RadioRef, ServiceState, SimState};
pub use routing::{CallRouting, Conferenceable};
pub use types::*;

/// Common imports for embedding the crate
pub mod prelude {
    pub use crate::capabilities::{Capabilities, Properties};
    pub use crate::conference::participant::ConferenceParticipant;
    pub use crate::conference::service::ConferenceService;
    pub use crate::conference::Conference;
    pub use crate::config::{CarrierConfig, RetryPolicy, TelephonyConfig};
    pub use crate::connection::Connection;
    pub use crate::emergency::{EmergencyDialer, EmergencyFanoutCoordinator, PhoneSelector, RadioRetryController};
    pub use crate::error::{Result, TelephonyError};
    pub use crate::logging::{setup_logging, LoggingConfig};
    pub use crate::radio::{DeviceSettings, Radio, RadioAccessFamily, RadioRef, ServiceState, SimState};
    pub use crate::routing::{CallRouting, Conferenceable};
    pub use crate::types::*;
}
