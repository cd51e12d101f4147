//! Configuration for telephony-core
//!
//! All sections deserialize from TOML and fall back to their defaults when
//! a key (or a whole section) is missing:
//!
//! ```toml
//! log_level = "debug"
//!
//! [emergency]
//! max_retries = 5
//! retry_interval_ms = 5000
//!
//! [conference]
//! max_generic_size = 5
//! cdma_admission_delay_ms = 6000
//!
//! [carrier]
//! max_conference_size = 6
//! size_enforced = true
//! video_conferencing_supported = false
//! allow_hold_in_ims_call = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelephonyError};

/// Default maximum number of IMS conference participants when the carrier
/// does not provide one.
pub const DEFAULT_MAX_CONFERENCE_SIZE: usize = 5;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    /// Log level used by [`crate::logging::LoggingConfig::from_config`]
    pub log_level: String,
    pub emergency: RetryPolicy,
    pub conference: ConferencePolicy,
    pub carrier: CarrierConfig,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            emergency: RetryPolicy::default(),
            conference: ConferencePolicy::default(),
            carrier: CarrierConfig::default(),
        }
    }
}

impl TelephonyConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: TelephonyConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Check values that would make the state machines misbehave
    pub fn validate(&self) -> Result<()> {
        if self.emergency.retry_interval_ms == 0 {
            return Err(TelephonyError::Config(
                "emergency.retry_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.conference.max_generic_size < 2 {
            return Err(TelephonyError::Config(format!(
                "conference.max_generic_size must be at least 2, got {}",
                self.conference.max_generic_size
            )));
        }
        if let Some(max) = self.carrier.max_conference_size {
            if max == 0 {
                return Err(TelephonyError::Config(
                    "carrier.max_conference_size must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Emergency radio-on retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Power-on retries after the first evaluation
    pub max_retries: u32,
    /// Delay between evaluations
    pub retry_interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_interval_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval_ms: retry_interval.as_millis() as u64,
        }
    }

    /// Short interval, used by tests and bench harnesses
    pub fn quick() -> Self {
        Self {
            max_retries: 5,
            retry_interval_ms: 500,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Conference formation policy for circuit-switched groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferencePolicy {
    /// Hard ceiling on GSM conference membership
    pub max_generic_size: usize,
    /// How long a new outgoing CDMA call is shown as dialing
    pub cdma_admission_delay_ms: u64,
}

impl Default for ConferencePolicy {
    fn default() -> Self {
        Self {
            max_generic_size: 5,
            cdma_admission_delay_ms: 6000,
        }
    }
}

impl ConferencePolicy {
    pub fn cdma_admission_delay(&self) -> Duration {
        Duration::from_millis(self.cdma_admission_delay_ms)
    }
}

/// Carrier-provided values consumed by the IMS conference group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    /// Maximum participant count; `None` when the carrier gives no value
    pub max_conference_size: Option<usize>,
    /// Whether `max_conference_size` is enforced
    pub size_enforced: bool,
    /// Whether the network supports video in conferences
    pub video_conferencing_supported: bool,
    /// Whether an IMS conference can be put on hold
    pub allow_hold_in_ims_call: bool,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            max_conference_size: None,
            size_enforced: false,
            video_conferencing_supported: false,
            allow_hold_in_ims_call: true,
        }
    }
}

impl CarrierConfig {
    /// Configured maximum, or [`DEFAULT_MAX_CONFERENCE_SIZE`]
    pub fn maximum_conference_size(&self) -> usize {
        self.max_conference_size
            .unwrap_or(DEFAULT_MAX_CONFERENCE_SIZE)
    }

    /// Enforced carrier with a given limit
    pub fn enforced(max: usize) -> Self {
        Self {
            max_conference_size: Some(max),
            size_enforced: true,
            ..Default::default()
        }
    }
}
