//! Emergency calling
//!
//! Everything needed to get an emergency call out when the device may be in
//! airplane mode or have its radios powered down:
//!
//! - [`retry::RadioRetryController`]: waits for one radio, re-issuing power-on
//! - [`fanout::EmergencyFanoutCoordinator`]: runs one controller per radio
//! - [`selector::PhoneSelector`]: picks the radio to dial on
//! - [`dialer::EmergencyDialer`]: ties the three together
//!
//! Readiness is always reported as a plain `bool`. Only the dialer turns a
//! `false` into an error, for callers that want a `Result`.

pub mod dialer;
pub mod fanout;
pub mod retry;
pub mod selector;

pub use dialer::EmergencyDialer;
pub use fanout::EmergencyFanoutCoordinator;
pub use retry::{is_ok_to_call, RadioRetryController, ReadyCallback, RetryPhase};
pub use selector::{PhoneSelector, RadioSnapshot, RedialCache};
