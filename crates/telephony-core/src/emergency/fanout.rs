//! Multi-radio emergency fan-out
//!
//! Runs one [`RadioRetryController`] per installed radio and reports a single
//! aggregate: `true` if any radio became usable. The aggregate fires once,
//! when the last controller finishes.
//!
//! Controllers report back by *sending* a completion message to the
//! coordinator's task; the coordinator never runs inside a controller
//! callback. Every message carries the fan-out generation it belongs to so a
//! restart discards late completions from the previous round.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::emergency::retry::{RadioRetryController, ReadyCallback};
use crate::radio::{DeviceSettings, RadioRef};

#[derive(Debug)]
enum FanoutEvent {
    ControllerDone {
        generation: u64,
        slot: usize,
        ready: bool,
    },
}

#[derive(Default)]
struct FanoutState {
    generation: u64,
    in_progress: HashSet<usize>,
    any_ready: bool,
    callback: Option<ReadyCallback>,
}

/// Drives every radio towards emergency readiness at once
pub struct EmergencyFanoutCoordinator {
    radios: Vec<RadioRef>,
    controllers: Vec<RadioRetryController>,
    settings: Arc<dyn DeviceSettings>,
    state: Arc<Mutex<FanoutState>>,
    event_tx: mpsc::UnboundedSender<FanoutEvent>,
    worker: JoinHandle<()>,
}

impl EmergencyFanoutCoordinator {
    /// Must be called from within a tokio runtime.
    pub fn new(radios: Vec<RadioRef>, settings: Arc<dyn DeviceSettings>, policy: RetryPolicy) -> Self {
        let controllers = radios
            .iter()
            .map(|_| RadioRetryController::new(policy.clone()))
            .collect();
        let state = Arc::new(Mutex::new(FanoutState::default()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_events(Arc::clone(&state), event_rx));

        Self {
            radios,
            controllers,
            settings,
            state,
            event_tx,
            worker,
        }
    }

    pub fn radio_count(&self) -> usize {
        self.radios.len()
    }

    /// Start (or restart) bringing every radio up.
    ///
    /// A fan-out still in flight is abandoned: its callback fires `false`
    /// before this returns.
    pub fn enable_emergency_calling(&self, callback: ReadyCallback) {
        let (generation, previous) = {
            let mut state = self.state.lock();
            let previous = state.callback.take();
            state.generation += 1;
            state.in_progress = (0..self.controllers.len()).collect();
            state.any_ready = false;
            state.callback = Some(callback);
            (state.generation, previous)
        };

        if let Some(previous) = previous {
            info!("Restarting emergency fan-out, abandoning previous request");
            previous(false);
        }

        if self.controllers.is_empty() {
            warn!("No radios installed, emergency calling unavailable");
            let callback = self.state.lock().callback.take();
            if let Some(callback) = callback {
                callback(false);
            }
            return;
        }

        info!("Enabling emergency calling on {} radio(s)", self.controllers.len());
        for (slot, (controller, radio)) in self.controllers.iter().zip(&self.radios).enumerate() {
            controller.cleanup();
            let tx = self.event_tx.clone();
            let accepted = controller.start(
                Arc::clone(radio),
                Box::new(move |ready| {
                    let _ = tx.send(FanoutEvent::ControllerDone {
                        generation,
                        slot,
                        ready,
                    });
                }),
            );
            if !accepted {
                // cleanup() just emptied the slot, so this only happens if a
                // completion raced in between; count the radio as not ready.
                let _ = self.event_tx.send(FanoutEvent::ControllerDone {
                    generation,
                    slot,
                    ready: false,
                });
            }
        }

        self.power_on_radio();
    }

    /// Same as [`enable_emergency_calling`](Self::enable_emergency_calling),
    /// awaiting the aggregate.
    pub async fn enable_emergency_calling_async(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.enable_emergency_calling(Box::new(move |ready| {
            let _ = tx.send(ready);
        }));
        rx.await.unwrap_or(false)
    }

    /// Abandon the current fan-out. Fires a pending callback with `false`.
    pub fn cancel(&self) {
        let callback = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.in_progress.clear();
            state.callback.take()
        };
        for controller in &self.controllers {
            controller.cleanup();
        }
        if let Some(callback) = callback {
            debug!("Emergency fan-out cancelled");
            callback(false);
        }
    }

    /// Whether a fan-out is waiting on at least one radio
    pub fn is_in_progress(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    /// Single power-on side effect for the whole device.
    ///
    /// Leaving airplane mode brings every radio up; otherwise each radio
    /// that is off gets its own power-on command.
    fn power_on_radio(&self) {
        if self.settings.is_airplane_mode_on() {
            info!("Turning off airplane mode for emergency call");
            self.settings.set_airplane_mode(false);
            return;
        }
        for radio in &self.radios {
            if !radio.is_radio_on() {
                debug!("Powering on {} for emergency call", radio.id());
                radio.set_radio_power(true);
            }
        }
    }
}

impl Drop for EmergencyFanoutCoordinator {
    fn drop(&mut self) {
        self.cancel();
        self.worker.abort();
    }
}

async fn run_events(state: Arc<Mutex<FanoutState>>, mut event_rx: mpsc::UnboundedReceiver<FanoutEvent>) {
    while let Some(event) = event_rx.recv().await {
        let FanoutEvent::ControllerDone {
            generation,
            slot,
            ready,
        } = event;

        let completed = {
            let mut state = state.lock();
            if generation != state.generation || !state.in_progress.remove(&slot) {
                None
            } else {
                state.any_ready |= ready;
                debug!(
                    "Radio slot {} finished (ready={}), {} remaining",
                    slot,
                    ready,
                    state.in_progress.len()
                );
                if state.in_progress.is_empty() {
                    state.callback.take().map(|cb| (cb, state.any_ready))
                } else {
                    None
                }
            }
        };

        if let Some((callback, any_ready)) = completed {
            info!("Emergency fan-out complete, radio ready: {}", any_ready);
            callback(any_ready);
        }
    }
}
