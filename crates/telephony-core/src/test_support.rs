//! In-memory radio, routing and settings doubles for unit tests

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::conference::Conference;
use crate::connection::Connection;
use crate::error::{Result, TelephonyError};
use crate::radio::{DeviceSettings, Radio, RadioAccessFamily, ServiceState, SimState};
use crate::routing::{CallRouting, Conferenceable};
use crate::types::{ConferenceId, ConnectionId, RadioId, RadioTechnology};

#[derive(Debug)]
struct FakeRadioState {
    service_state: ServiceState,
    radio_on: bool,
    off_hook: bool,
    sim_state: SimState,
    has_icc_card: bool,
    raf: RadioAccessFamily,
    technology: RadioTechnology,
    power_on_brings_service: bool,
    refuse_commands: bool,
}

pub struct FakeRadio {
    id: RadioId,
    state: Mutex<FakeRadioState>,
    tx: broadcast::Sender<ServiceState>,
    pub power_on_commands: AtomicUsize,
    pub flashes: AtomicUsize,
    pub conference_requests: AtomicUsize,
    pub dialed: Mutex<Vec<ConnectionId>>,
    pub hung_up: Mutex<Vec<ConnectionId>>,
}

impl FakeRadio {
    /// In service, powered on, unlocked SIM, LTE
    pub fn new(slot: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(Self {
            id: RadioId(slot),
            state: Mutex::new(FakeRadioState {
                service_state: ServiceState::InService,
                radio_on: true,
                off_hook: false,
                sim_state: SimState::Ready,
                has_icc_card: true,
                raf: RadioAccessFamily::LTE,
                technology: RadioTechnology::Gsm,
                power_on_brings_service: true,
                refuse_commands: false,
            }),
            tx,
            power_on_commands: AtomicUsize::new(0),
            flashes: AtomicUsize::new(0),
            conference_requests: AtomicUsize::new(0),
            dialed: Mutex::new(Vec::new()),
            hung_up: Mutex::new(Vec::new()),
        })
    }

    /// Powered off; power-on commands have no effect
    pub fn dead(slot: usize) -> Arc<Self> {
        let radio = Self::new(slot);
        {
            let mut state = radio.state.lock();
            state.service_state = ServiceState::PowerOff;
            state.radio_on = false;
            state.power_on_brings_service = false;
        }
        radio
    }

    pub fn configure(
        &self,
        service_state: ServiceState,
        sim_state: SimState,
        has_icc_card: bool,
        raf: RadioAccessFamily,
    ) {
        let mut state = self.state.lock();
        state.service_state = service_state;
        state.sim_state = sim_state;
        state.has_icc_card = has_icc_card;
        state.raf = raf;
    }

    pub fn set_technology(&self, technology: RadioTechnology) {
        self.state.lock().technology = technology;
    }

    /// Change service state and notify listeners
    pub fn set_service_state(&self, service_state: ServiceState, radio_on: bool) {
        {
            let mut state = self.state.lock();
            state.service_state = service_state;
            state.radio_on = radio_on;
        }
        let _ = self.tx.send(service_state);
    }

    pub fn power_on_count(&self) -> usize {
        self.power_on_commands.load(Ordering::SeqCst)
    }

    /// Make call commands fail the way a modem rejection does
    pub fn set_refuse_commands(&self, refuse: bool) {
        self.state.lock().refuse_commands = refuse;
    }

    fn command(&self, name: &str) -> Result<()> {
        if self.state.lock().refuse_commands {
            return Err(TelephonyError::RadioCommand {
                radio: self.id,
                reason: format!("{name} rejected"),
            });
        }
        Ok(())
    }
}

impl Radio for FakeRadio {
    fn id(&self) -> RadioId {
        self.id
    }

    fn service_state(&self) -> ServiceState {
        self.state.lock().service_state
    }

    fn is_radio_on(&self) -> bool {
        self.state.lock().radio_on
    }

    fn is_off_hook(&self) -> bool {
        self.state.lock().off_hook
    }

    fn sim_state(&self) -> SimState {
        self.state.lock().sim_state
    }

    fn has_icc_card(&self) -> bool {
        self.state.lock().has_icc_card
    }

    fn radio_access_family(&self) -> RadioAccessFamily {
        self.state.lock().raf
    }

    fn voice_technology(&self) -> RadioTechnology {
        self.state.lock().technology
    }

    fn set_radio_power(&self, on: bool) {
        if on {
            self.power_on_commands.fetch_add(1, Ordering::SeqCst);
        }
        let brings_service = self.state.lock().power_on_brings_service;
        if on && brings_service {
            self.set_service_state(ServiceState::InService, true);
        }
    }

    fn subscribe_service_state(&self) -> broadcast::Receiver<ServiceState> {
        self.tx.subscribe()
    }

    fn dial(&self, connection: &Connection) -> Result<()> {
        self.command("dial")?;
        self.dialed.lock().push(connection.id());
        Ok(())
    }

    fn hangup(&self, connection: &Connection) -> Result<()> {
        self.command("hangup")?;
        self.hung_up.lock().push(connection.id());
        Ok(())
    }

    fn switch_holding_and_active(&self) -> Result<()> {
        self.command("flash")?;
        self.flashes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn conference(&self) -> Result<()> {
        self.command("conference")?;
        self.conference_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSettings {
    airplane: Mutex<bool>,
    radios: Mutex<Vec<Arc<FakeRadio>>>,
}

impl FakeSettings {
    /// Airplane mode on; turning it off powers every given radio on
    pub fn airplane(radios: Vec<Arc<FakeRadio>>) -> Arc<Self> {
        Arc::new(Self {
            airplane: Mutex::new(true),
            radios: Mutex::new(radios),
        })
    }

    pub fn off() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl DeviceSettings for FakeSettings {
    fn is_airplane_mode_on(&self) -> bool {
        *self.airplane.lock()
    }

    fn set_airplane_mode(&self, on: bool) {
        *self.airplane.lock() = on;
        if !on {
            for radio in self.radios.lock().iter() {
                radio.set_service_state(ServiceState::InService, true);
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingRouting {
    pub connections: Mutex<HashMap<ConnectionId, Option<ConferenceId>>>,
    pub conferences: Mutex<HashMap<ConferenceId, Arc<Conference>>>,
    pub conferenceables: Mutex<HashMap<Conferenceable, Vec<Conferenceable>>>,
    pub removed_connections: Mutex<Vec<ConnectionId>>,
    pub removed_conferences: Mutex<Vec<ConferenceId>>,
}

impl RecordingRouting {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the routing layer learning about a radio leg
    pub fn register(&self, id: ConnectionId) {
        self.connections.lock().insert(id, None);
    }

    pub fn conferenceable_with(&self, target: Conferenceable) -> HashSet<Conferenceable> {
        self.conferenceables
            .lock()
            .get(&target)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn children_of(&self, conference: ConferenceId) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|parent| **parent == Some(conference))
            .count()
    }

    pub fn live_conferences(&self) -> Vec<Arc<Conference>> {
        self.conferences.lock().values().cloned().collect()
    }
}

impl CallRouting for RecordingRouting {
    fn add_connection(&self, connection: Arc<Connection>, parent: Option<ConferenceId>) {
        self.connections.lock().insert(connection.id(), parent);
    }

    fn remove_connection(&self, id: ConnectionId) {
        self.connections.lock().remove(&id);
        self.removed_connections.lock().push(id);
    }

    fn add_conference(&self, conference: Arc<Conference>) {
        self.conferences.lock().insert(conference.id(), conference);
    }

    fn remove_conference(&self, id: ConferenceId) {
        self.conferences.lock().remove(&id);
        self.removed_conferences.lock().push(id);
    }

    fn set_conferenceable(&self, target: Conferenceable, with: Vec<Conferenceable>) {
        self.conferenceables.lock().insert(target, with);
    }

    fn existing_connections(&self) -> HashSet<ConnectionId> {
        self.connections.lock().keys().copied().collect()
    }
}
