//! Per-radio radio-on sequence for emergency calls
//!
//! A [`RadioRetryController`] waits until one radio can carry an emergency
//! call, nudging it with power-on commands along the way, and reports the
//! outcome exactly once through the callback handed to
//! [`start`](RadioRetryController::start).
//!
//! # State machine
//!
//! ```text
//! Idle --start--> Sequencing --ok / retries exhausted / cleanup--> Done
//!   ^                                                                |
//!   +------------------------------ start ---------------------------+
//! ```
//!
//! While `Sequencing`, two things can trigger an evaluation of
//! [`is_ok_to_call`]: a service-state change reported by the radio, and the
//! one-shot retry timer. Only the timer counts retries and re-issues the
//! power-on command; a service-state change that is not yet good enough
//! leaves everything armed as it was.
//!
//! # Event serialization
//!
//! `start` parks the callback, subscribes to the radio's service-state
//! broadcast and enqueues a `Start` event carrying the receiver; everything
//! else happens on the controller's own task. A state change the caller
//! triggers right after `start` returns is therefore never missed. Each sequence gets a new epoch, and
//! every queued event carries the epoch it belongs to, so events left over
//! from a cleaned-up sequence are dropped on arrival. The callback is always
//! invoked with no lock held.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::radio::{Radio, RadioRef, ServiceState};
use crate::timer::GenerationTimer;
use crate::types::RadioId;

/// Completion callback: `true` when the radio is ready for an emergency call
pub type ReadyCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Phase of the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Sequencing,
    Done,
}

/// Whether an emergency call can be placed on `radio` right now
pub fn is_ok_to_call(radio: &dyn Radio) -> bool {
    radio.is_off_hook() || radio.is_radio_on()
}

#[derive(Debug)]
enum RetryEvent {
    Start {
        epoch: u64,
        service_rx: broadcast::Receiver<ServiceState>,
    },
    ServiceStateChanged { epoch: u64 },
    RetryTimeout { epoch: u64, generation: u64 },
}

struct RetryState {
    phase: RetryPhase,
    radio: Option<RadioRef>,
    retries: u32,
    callback: Option<ReadyCallback>,
    listener: Option<JoinHandle<()>>,
    timer: GenerationTimer,
    epoch: u64,
}

impl RetryState {
    /// Release registrations and reset. Returns the callback if it has not fired.
    fn cleanup(&mut self) -> Option<ReadyCallback> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.timer.cancel();
        self.radio = None;
        self.retries = 0;
        self.epoch += 1;
        if self.phase == RetryPhase::Sequencing {
            self.phase = RetryPhase::Done;
        }
        self.callback.take()
    }
}

/// Radio-on retry sequence for one radio
pub struct RadioRetryController {
    policy: RetryPolicy,
    state: Arc<Mutex<RetryState>>,
    event_tx: mpsc::UnboundedSender<RetryEvent>,
    worker: JoinHandle<()>,
}

impl RadioRetryController {
    /// Create a controller and spawn its event task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(policy: RetryPolicy) -> Self {
        let state = Arc::new(Mutex::new(RetryState {
            phase: RetryPhase::Idle,
            radio: None,
            retries: 0,
            callback: None,
            listener: None,
            timer: GenerationTimer::new(),
            epoch: 0,
        }));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_events(
            Arc::clone(&state),
            policy.clone(),
            event_tx.clone(),
            event_rx,
        ));

        Self {
            policy,
            state,
            event_tx,
            worker,
        }
    }

    /// Begin waiting for `radio` to become usable.
    ///
    /// Returns `false` and drops `callback` without calling it when a
    /// sequence is already in flight.
    pub fn start(&self, radio: RadioRef, callback: ReadyCallback) -> bool {
        let radio_id = radio.id();
        let (epoch, service_rx) = {
            let mut state = self.state.lock();
            if state.callback.is_some() {
                debug!("Retry sequence already in flight on {}, rejecting start", radio_id);
                return false;
            }
            let service_rx = radio.subscribe_service_state();
            state.phase = RetryPhase::Sequencing;
            state.radio = Some(radio);
            state.retries = 0;
            state.callback = Some(callback);
            state.epoch += 1;
            (state.epoch, service_rx)
        };

        info!(
            "Starting radio-on sequence on {} (max_retries={}, interval={:?})",
            radio_id,
            self.policy.max_retries,
            self.policy.retry_interval()
        );
        if self.event_tx.send(RetryEvent::Start { epoch, service_rx }).is_err() {
            // Event task is gone; fail the sequence now rather than never.
            let callback = self.state.lock().cleanup();
            if let Some(callback) = callback {
                callback(false);
            }
        }
        true
    }

    /// Abort the sequence. Fires a pending callback with `false` before returning.
    pub fn cleanup(&self) {
        let callback = self.state.lock().cleanup();
        if let Some(callback) = callback {
            debug!("Retry sequence cleaned up before completion");
            callback(false);
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.state.lock().phase
    }

    /// Power-on retries issued in the current sequence
    pub fn retries(&self) -> u32 {
        self.state.lock().retries
    }

    pub fn radio(&self) -> Option<RadioId> {
        self.state.lock().radio.as_ref().map(|r| r.id())
    }
}

impl Drop for RadioRetryController {
    fn drop(&mut self) {
        self.cleanup();
        self.worker.abort();
    }
}

async fn run_events(
    state: Arc<Mutex<RetryState>>,
    policy: RetryPolicy,
    event_tx: mpsc::UnboundedSender<RetryEvent>,
    mut event_rx: mpsc::UnboundedReceiver<RetryEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        let outcome = {
            let mut state = state.lock();
            handle_event(&mut state, &policy, &event_tx, event)
        };
        if let Some((callback, ready)) = outcome {
            callback(ready);
        }
    }
}

/// Apply one event. Returns the callback to fire, if the sequence finished.
fn handle_event(
    state: &mut RetryState,
    policy: &RetryPolicy,
    event_tx: &mpsc::UnboundedSender<RetryEvent>,
    event: RetryEvent,
) -> Option<(ReadyCallback, bool)> {
    match event {
        RetryEvent::Start { epoch, service_rx } => {
            if epoch != state.epoch || state.callback.is_none() || state.radio.is_none() {
                return None;
            }

            if let Some(stale) = state.listener.take() {
                stale.abort();
            }
            state.listener = Some(spawn_listener(service_rx, epoch, event_tx.clone()));
            state.timer.arm(policy.retry_interval(), event_tx.clone(), move |generation| {
                RetryEvent::RetryTimeout { epoch, generation }
            });
            None
        }
        RetryEvent::ServiceStateChanged { epoch } => {
            if epoch != state.epoch || state.callback.is_none() {
                return None;
            }
            let radio = state.radio.clone()?;
            if is_ok_to_call(radio.as_ref()) {
                info!("{} ready after service state change", radio.id());
                return finish(state, true);
            }
            debug!("{} service state changed but not ready yet", radio.id());
            None
        }
        RetryEvent::RetryTimeout { epoch, generation } => {
            if epoch != state.epoch || !state.timer.fire(generation) || state.callback.is_none() {
                return None;
            }
            let radio = state.radio.clone()?;
            if is_ok_to_call(radio.as_ref()) {
                info!("{} ready on retry timer", radio.id());
                return finish(state, true);
            }

            state.retries += 1;
            if state.retries > policy.max_retries {
                warn!("{} not ready after {} retries, giving up", radio.id(), policy.max_retries);
                return finish(state, false);
            }

            debug!("{} not ready, retry {}/{}", radio.id(), state.retries, policy.max_retries);
            radio.set_radio_power(true);
            state.timer.arm(policy.retry_interval(), event_tx.clone(), move |generation| {
                RetryEvent::RetryTimeout { epoch, generation }
            });
            None
        }
    }
}

fn finish(state: &mut RetryState, ready: bool) -> Option<(ReadyCallback, bool)> {
    let callback = state.callback.take();
    state.cleanup();
    callback.map(|cb| (cb, ready))
}

fn spawn_listener(
    mut rx: broadcast::Receiver<ServiceState>,
    epoch: u64,
    event_tx: mpsc::UnboundedSender<RetryEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    if event_tx.send(RetryEvent::ServiceStateChanged { epoch }).is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
