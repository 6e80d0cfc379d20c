//! Location registry.
//!
//! Maps bound actors to their [`Location`]: one record per binding, keyed by
//! the absolute path the actor was bound at. The registry is the sole owner
//! of every entry; a [`Location`] is only a handle and turns inactive as
//! soon as its entry is removed. Re-binding an actor at the same path yields
//! a new [`LocationId`].
//!
//! Three indexes are kept in lockstep: actor -> location, location ->
//! entry, uri -> actor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pairwise_id::{ActorId, LocationId};
use pairwise_reactive::{Computation, Dependency, Tracker};
use tracing::debug;

use crate::actors::Mailbox;
use crate::error::RegistryError;
use crate::path::ActorPath;

#[derive(Debug)]
struct Entry {
    key: ActorPath,
    actor: ActorId,
    actor_type: String,
    mailbox: Mailbox,
    dep: Dependency,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_actor: HashMap<ActorId, LocationId>,
    by_location: HashMap<LocationId, Entry>,
    by_uri: HashMap<String, ActorId>,
}

/// Process-wide table of bound actors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    tracker: Tracker,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracker owning the location dependencies. Computations that depend
    /// on locations must be created from it.
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Creates and indexes a new location for `actor` bound at `path`.
    pub fn register(
        &self,
        actor: ActorId,
        path: &ActorPath,
        actor_type: &str,
        mailbox: Mailbox,
    ) -> Result<Location, RegistryError> {
        if path.segments().is_empty() {
            return Err(RegistryError::NotBound(actor));
        }
        let uri = path.to_string();
        let mut state = self.lock();
        if state.by_actor.contains_key(&actor) {
            return Err(RegistryError::AlreadyRegistered(actor));
        }
        if state.by_uri.contains_key(&uri) {
            return Err(RegistryError::PathInUse(uri));
        }

        let id = LocationId::new();
        state.by_actor.insert(actor, id);
        state.by_uri.insert(uri.clone(), actor);
        state.by_location.insert(
            id,
            Entry {
                key: path.clone(),
                actor,
                actor_type: actor_type.to_string(),
                mailbox,
                dep: self.tracker.dependency(),
            },
        );
        debug!(uri = %uri, location = %id, "Location registered");

        Ok(Location {
            id,
            key: path.clone(),
            actor,
            registry: self.clone(),
        })
    }

    /// The actor currently bound at `uri`.
    pub fn resolve(&self, uri: &str) -> Option<ActorId> {
        self.lock().by_uri.get(uri).copied()
    }

    /// The location of a bound actor.
    pub fn location_of(&self, actor: ActorId) -> Option<Location> {
        let state = self.lock();
        let id = *state.by_actor.get(&actor)?;
        let entry = state.by_location.get(&id)?;
        Some(Location {
            id,
            key: entry.key.clone(),
            actor,
            registry: self.clone(),
        })
    }

    /// Mailbox and type name of the actor bound at `uri`.
    pub(crate) fn mailbox(&self, uri: &str) -> Option<(Mailbox, String)> {
        let state = self.lock();
        let actor = state.by_uri.get(uri)?;
        let id = state.by_actor.get(actor)?;
        let entry = state.by_location.get(id)?;
        Some((entry.mailbox.clone(), entry.actor_type.clone()))
    }

    /// Removes every index entry of `actor` and signals one final change on
    /// its location.
    pub fn unregister(&self, actor: ActorId) -> Result<Location, RegistryError> {
        let (id, entry) = {
            let mut state = self.lock();
            let id = state
                .by_actor
                .remove(&actor)
                .ok_or(RegistryError::NotRegistered(actor))?;
            let entry = state
                .by_location
                .remove(&id)
                .ok_or(RegistryError::NotRegistered(actor))?;
            state.by_uri.remove(&entry.key.to_string());
            (id, entry)
        };
        let invalidated = entry.dep.changed();
        debug!(uri = %entry.key, location = %id, invalidated, "Location unregistered");

        Ok(Location {
            id,
            key: entry.key,
            actor: entry.actor,
            registry: self.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().by_location.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dependency(&self, id: LocationId) -> Option<Dependency> {
        self.lock().by_location.get(&id).map(|e| e.dep.clone())
    }
}

/// Handle to one binding of an actor.
#[derive(Debug, Clone)]
pub struct Location {
    id: LocationId,
    key: ActorPath,
    actor: ActorId,
    registry: Registry,
}

impl Location {
    pub fn id(&self) -> LocationId {
        self.id
    }

    /// Absolute path at bind time. Never changes.
    pub fn key(&self) -> &ActorPath {
        &self.key
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// True until the actor is unregistered.
    pub fn is_active(&self) -> bool {
        self.registry.dependency(self.id).is_some()
    }

    fn active_dependency(&self) -> Result<Dependency, RegistryError> {
        self.registry
            .dependency(self.id)
            .ok_or_else(|| RegistryError::Inactive(self.key.to_string()))
    }

    /// Subscribes `computation` to changes of this location.
    pub fn depend(&self, computation: &Computation) -> Result<(), RegistryError> {
        self.active_dependency()?.depend(computation);
        Ok(())
    }

    /// Signals a change to every dependent computation.
    pub fn changed(&self) -> Result<usize, RegistryError> {
        Ok(self.active_dependency()?.changed())
    }
}
