//! Selection state for one session.
//!
//! Holds the chosen track and racer, plus the race id once the engine has created a race.
//! UI layers write the track/racer fields; only the engine writes the race id.

use crate::error::{LifecycleResult, MissingSelection, RaceError};
use crate::model::{RaceId, RacerId, TrackId};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<I> {
    pub id: I,
    pub name: String,
}

#[derive(Debug, Default, Clone)]
pub struct SelectionStore {
    track: Option<Selection<TrackId>>,
    racer: Option<Selection<RacerId>>,
    race_id: Option<RaceId>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_track(&mut self, id: TrackId, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(track = %id, %name, "selected track");
        self.track = Some(Selection { id, name });
    }

    pub fn select_racer(&mut self, id: RacerId, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(racer = %id, %name, "selected racer");
        self.racer = Some(Selection { id, name });
    }

    pub fn track(&self) -> Option<&Selection<TrackId>> {
        self.track.as_ref()
    }

    pub fn racer(&self) -> Option<&Selection<RacerId>> {
        self.racer.as_ref()
    }

    pub fn race_id(&self) -> Option<RaceId> {
        self.race_id
    }

    /// Both selections required to create a race, or what is still missing.
    pub fn ready(&self) -> LifecycleResult<(RacerId, TrackId)> {
        match (&self.racer, &self.track) {
            (Some(r), Some(t)) => Ok((r.id, t.id)),
            (Some(_), None) => Err(RaceError::PreconditionUnmet {
                missing: MissingSelection::Track,
            }),
            (None, Some(_)) => Err(RaceError::PreconditionUnmet {
                missing: MissingSelection::Racer,
            }),
            (None, None) => Err(RaceError::PreconditionUnmet {
                missing: MissingSelection::Both,
            }),
        }
    }

    /// Records the id of a freshly created race. Fails if a race is already assigned.
    pub(crate) fn set_race(&mut self, id: RaceId) -> LifecycleResult<()> {
        if let Some(current) = self.race_id {
            return Err(RaceError::RaceIdAlreadyAssigned { current });
        }
        tracing::debug!(race = %id, "race assigned");
        self.race_id = Some(id);
        Ok(())
    }

    pub(crate) fn clear_race(&mut self) {
        self.race_id = None;
    }
}

/// Store shared between UI layers and the engine.
pub type SharedStore = Arc<Mutex<SelectionStore>>;

pub fn shared(store: SelectionStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Lock the store, recovering from poisoning: the store has no cross-field invariant a
/// panicking writer could break halfway.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, SelectionStore> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}
