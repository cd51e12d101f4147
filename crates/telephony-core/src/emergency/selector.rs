//! Emergency radio selection on multi-SIM devices
//!
//! [`PhoneSelector::rank`] produces a total order over the installed radios:
//!
//! 1. the user's default voice radio, if it is in service or emergency-only
//! 2. every other radio that is in service or emergency-only, by slot
//! 3. the rest, best first:
//!    - not PIN/PUK locked before locked
//!    - more radio access family bits before fewer
//!    - higher strongest generation before lower
//!    - the first of these slots holding a SIM (if any has one), otherwise
//!      the platform default slot
//!    - lower slot index
//! 4. no radios at all: the platform default radio alone
//!
//! Redial walks the same order, skipping radios that already failed for the
//! call; see [`RedialCache`].

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::radio::{Radio, RadioAccessFamily, ServiceState, SimState};
use crate::types::{ConnectionId, RadioId};

/// Point-in-time view of one radio, as seen by the selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioSnapshot {
    pub id: RadioId,
    pub service_state: ServiceState,
    pub sim_state: SimState,
    pub has_sim: bool,
    pub raf: RadioAccessFamily,
}

impl RadioSnapshot {
    pub fn capture(radio: &dyn Radio) -> Self {
        Self {
            id: radio.id(),
            service_state: radio.service_state(),
            sim_state: radio.sim_state(),
            has_sim: radio.has_icc_card(),
            raf: radio.radio_access_family(),
        }
    }

    fn is_locked(&self) -> bool {
        self.sim_state.is_locked()
    }
}

#[derive(Debug, Clone)]
pub struct PhoneSelector {
    default_voice: Option<RadioId>,
    platform_default: RadioId,
}

impl PhoneSelector {
    pub fn new(default_voice: Option<RadioId>, platform_default: RadioId) -> Self {
        Self {
            default_voice,
            platform_default,
        }
    }

    /// Full preference order, best first
    pub fn rank(&self, radios: &[RadioSnapshot]) -> Vec<RadioId> {
        if radios.is_empty() {
            return vec![self.platform_default];
        }

        let mut by_slot: Vec<&RadioSnapshot> = radios.iter().collect();
        by_slot.sort_by_key(|r| r.id);

        let mut order = Vec::with_capacity(radios.len());

        if let Some(default_voice) = self.default_voice {
            if let Some(r) = by_slot.iter().find(|r| r.id == default_voice) {
                if r.service_state.can_place_emergency_call() {
                    order.push(r.id);
                }
            }
        }

        for r in &by_slot {
            if r.service_state.can_place_emergency_call() && !order.contains(&r.id) {
                order.push(r.id);
            }
        }

        let mut rest: Vec<&RadioSnapshot> = by_slot
            .into_iter()
            .filter(|r| !order.contains(&r.id))
            .collect();
        // Only radios still unplaced compete for the SIM-slot preference.
        let first_sim_slot = rest.iter().find(|r| r.has_sim).map(|r| r.id);
        rest.sort_by(|a, b| self.compare_unreachable(a, b, first_sim_slot));
        order.extend(rest.into_iter().map(|r| r.id));

        order
    }

    /// Best radio not in `excluded`
    pub fn select(&self, radios: &[RadioSnapshot], excluded: &[RadioId]) -> Option<RadioId> {
        let choice = self
            .rank(radios)
            .into_iter()
            .find(|id| !excluded.contains(id));
        debug!("Emergency radio selection (excluded {:?}): {:?}", excluded, choice);
        choice
    }

    /// `Less` means `a` is preferred
    fn compare_unreachable(
        &self,
        a: &RadioSnapshot,
        b: &RadioSnapshot,
        first_sim_slot: Option<RadioId>,
    ) -> Ordering {
        let preferred_slot = first_sim_slot.unwrap_or(self.platform_default);

        a.is_locked()
            .cmp(&b.is_locked())
            .then_with(|| b.raf.bit_count().cmp(&a.raf.bit_count()))
            .then_with(|| b.raf.highest_generation().cmp(&a.raf.highest_generation()))
            .then_with(|| (b.id == preferred_slot).cmp(&(a.id == preferred_slot)))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Radios still worth trying, per emergency call
#[derive(Debug, Default)]
pub struct RedialCache {
    remaining: HashMap<ConnectionId, VecDeque<RadioId>>,
}

impl RedialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next radio for `connection` after `failed` did not work.
    ///
    /// `order` is only consulted the first time a connection is redialed.
    /// Returns `None` once every radio has failed; the entry is then dropped.
    pub fn phone_for_redial(
        &mut self,
        connection: ConnectionId,
        failed: RadioId,
        order: impl FnOnce() -> Vec<RadioId>,
    ) -> Option<RadioId> {
        let remaining = self
            .remaining
            .entry(connection)
            .or_insert_with(|| order().into_iter().collect());
        remaining.retain(|id| *id != failed);

        match remaining.front().copied() {
            Some(next) => {
                info!("Redialing {} on {} after {} failed", connection, next, failed);
                Some(next)
            }
            None => {
                info!("No radio left to redial {}", connection);
                self.remaining.remove(&connection);
                None
            }
        }
    }

    /// Forget a finished call
    pub fn clear(&mut self, connection: ConnectionId) {
        self.remaining.remove(&connection);
    }
}
