//! Shared doubles for the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use telephony_core::radio::RadioAccessFamily;
use telephony_core::{
    CallRouting, Conference, ConferenceId, Conferenceable, Connection, ConnectionId, DeviceSettings, Radio,
    RadioId, RadioTechnology, Result, ServiceState, SimState,
};

/// Scriptable radio. `powers_up` decides whether a power-on command brings service.
pub struct TestRadio {
    id: RadioId,
    service: Mutex<ServiceState>,
    radio_on: Mutex<bool>,
    sim: Mutex<(SimState, bool)>,
    raf: Mutex<RadioAccessFamily>,
    technology: Mutex<RadioTechnology>,
    powers_up: bool,
    tx: broadcast::Sender<ServiceState>,
    pub power_ons: AtomicUsize,
    pub flashes: AtomicUsize,
    pub merges: AtomicUsize,
    pub dialed: Mutex<Vec<ConnectionId>>,
}

impl TestRadio {
    fn build(slot: usize, service: ServiceState, radio_on: bool, powers_up: bool) -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(Self {
            id: RadioId(slot),
            service: Mutex::new(service),
            radio_on: Mutex::new(radio_on),
            sim: Mutex::new((SimState::Ready, true)),
            raf: Mutex::new(RadioAccessFamily::LTE),
            technology: Mutex::new(RadioTechnology::Gsm),
            powers_up,
            tx,
            power_ons: AtomicUsize::new(0),
            flashes: AtomicUsize::new(0),
            merges: AtomicUsize::new(0),
            dialed: Mutex::new(Vec::new()),
        })
    }

    pub fn in_service(slot: usize) -> Arc<Self> {
        Self::build(slot, ServiceState::InService, true, true)
    }

    /// Off, comes up on the first power-on command
    pub fn off(slot: usize) -> Arc<Self> {
        Self::build(slot, ServiceState::PowerOff, false, true)
    }

    /// Off and stays off
    pub fn broken(slot: usize) -> Arc<Self> {
        Self::build(slot, ServiceState::PowerOff, false, false)
    }

    pub fn with_sim(self: Arc<Self>, sim: SimState, present: bool) -> Arc<Self> {
        *self.sim.lock() = (sim, present);
        self
    }

    pub fn with_raf(self: Arc<Self>, raf: RadioAccessFamily) -> Arc<Self> {
        *self.raf.lock() = raf;
        self
    }

    pub fn with_service(self: Arc<Self>, service: ServiceState) -> Arc<Self> {
        *self.service.lock() = service;
        self
    }

    pub fn bring_up(&self) {
        *self.service.lock() = ServiceState::InService;
        *self.radio_on.lock() = true;
        let _ = self.tx.send(ServiceState::InService);
    }

    pub fn power_on_count(&self) -> usize {
        self.power_ons.load(Ordering::SeqCst)
    }
}

impl Radio for TestRadio {
    fn id(&self) -> RadioId {
        self.id
    }

    fn service_state(&self) -> ServiceState {
        *self.service.lock()
    }

    fn is_radio_on(&self) -> bool {
        *self.radio_on.lock()
    }

    fn is_off_hook(&self) -> bool {
        false
    }

    fn sim_state(&self) -> SimState {
        self.sim.lock().0
    }

    fn has_icc_card(&self) -> bool {
        self.sim.lock().1
    }

    fn radio_access_family(&self) -> RadioAccessFamily {
        *self.raf.lock()
    }

    fn voice_technology(&self) -> RadioTechnology {
        *self.technology.lock()
    }

    fn set_radio_power(&self, on: bool) {
        if !on {
            return;
        }
        self.power_ons.fetch_add(1, Ordering::SeqCst);
        if self.powers_up {
            self.bring_up();
        }
    }

    fn subscribe_service_state(&self) -> broadcast::Receiver<ServiceState> {
        self.tx.subscribe()
    }

    fn dial(&self, connection: &Connection) -> Result<()> {
        self.dialed.lock().push(connection.id());
        Ok(())
    }

    fn hangup(&self, _connection: &Connection) -> Result<()> {
        Ok(())
    }

    fn switch_holding_and_active(&self) -> Result<()> {
        self.flashes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn conference(&self) -> Result<()> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Device settings with airplane mode off
#[derive(Default)]
pub struct TestSettings {
    airplane: Mutex<bool>,
}

impl TestSettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl DeviceSettings for TestSettings {
    fn is_airplane_mode_on(&self) -> bool {
        *self.airplane.lock()
    }

    fn set_airplane_mode(&self, on: bool) {
        *self.airplane.lock() = on;
    }
}

/// Routing layer that registers every leg it is told about
#[derive(Default)]
pub struct TestRouting {
    pub connections: Mutex<HashSet<ConnectionId>>,
    pub conferences: Mutex<HashMap<ConferenceId, Arc<Conference>>>,
    pub conferenceables: Mutex<HashMap<Conferenceable, Vec<Conferenceable>>>,
}

impl TestRouting {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, id: ConnectionId) {
        self.connections.lock().insert(id);
    }

    pub fn existing_connections_snapshot(&self) -> Vec<ConnectionId> {
        self.connections.lock().iter().copied().collect()
    }

    pub fn conferenceable_with(&self, target: Conferenceable) -> Vec<Conferenceable> {
        self.conferenceables.lock().get(&target).cloned().unwrap_or_default()
    }
}

impl CallRouting for TestRouting {
    fn add_connection(&self, connection: Arc<Connection>, _parent: Option<ConferenceId>) {
        self.connections.lock().insert(connection.id());
    }

    fn remove_connection(&self, id: ConnectionId) {
        self.connections.lock().remove(&id);
    }

    fn add_conference(&self, conference: Arc<Conference>) {
        self.conferences.lock().insert(conference.id(), conference);
    }

    fn remove_conference(&self, id: ConferenceId) {
        self.conferences.lock().remove(&id);
    }

    fn set_conferenceable(&self, target: Conferenceable, with: Vec<Conferenceable>) {
        self.conferenceables.lock().insert(target, with);
    }

    fn existing_connections(&self) -> HashSet<ConnectionId> {
        self.connections.lock().clone()
    }
}
