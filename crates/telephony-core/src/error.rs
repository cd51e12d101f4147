//! Error types for telephony-core
//!
//! Most failures in this crate are *not* errors: emergency readiness is
//! reported as a `bool`, a duplicate retry start is silently rejected and a
//! generic-conference recalculation that cannot run yet is deferred. The
//! variants below cover the remaining cases where a caller asked for
//! something that cannot be done.

use thiserror::Error;

use crate::types::{ConferenceId, ConnectionId, DisconnectCause, RadioId};

/// Errors that can occur in telephony-core
#[derive(Error, Debug)]
pub enum TelephonyError {
    /// No radio could be brought into a state where an emergency call is possible
    #[error("Radio unavailable for emergency call (cause: {cause:?})")]
    RadioUnavailable { cause: DisconnectCause },

    /// Every candidate radio has already been tried for this call
    #[error("No radio left to redial connection {0}")]
    NoRadioAvailable(ConnectionId),

    /// Radio not installed
    #[error("Radio not found: {0}")]
    RadioNotFound(RadioId),

    /// A radio command was refused by the modem
    #[error("Radio {radio} command failed: {reason}")]
    RadioCommand { radio: RadioId, reason: String },

    /// Connection not known to the conference service
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Conference not known to the conference service
    #[error("Conference not found: {0}")]
    ConferenceNotFound(ConferenceId),

    /// Operation is not valid for the current call state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation is not supported by this conference type
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The conference service task is gone
    #[error("Conference service stopped")]
    ServiceStopped,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for telephony-core operations
pub type Result<T> = std::result::Result<T, TelephonyError>;

impl TelephonyError {
    /// Disconnect cause a routing layer should report for this error
    pub fn disconnect_cause(&self) -> DisconnectCause {
        match self {
            TelephonyError::RadioUnavailable { cause } => *cause,
            TelephonyError::NoRadioAvailable(_) => DisconnectCause::Error,
            TelephonyError::RadioCommand { .. } => DisconnectCause::Error,
            _ => DisconnectCause::Other,
        }
    }

    /// Whether the caller may retry on a different radio
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelephonyError::RadioCommand { .. } | TelephonyError::RadioUnavailable { .. }
        )
    }
}
