//! Pairing requests and the readiness barrier.
//!
//! A [`PairingRequest`] is one N-party rendezvous: every declared location
//! has its own readiness cell, so readiness signals may arrive in any order
//! and any number of times. A [`PairingTable`] owns every pending request of
//! a session together with the single barrier computation that watches them.
//!
//! # Invariants
//!
//! - A request is released at most once: it leaves the table the moment its
//!   barrier fires
//! - A request is released exactly when its last missing location turns
//!   ready, regardless of arrival order
//! - Dynamic pairing ids strictly increase and are never reused

use std::collections::BTreeMap;

use pairwise_id::{PairingId, PairingIdAllocator};
use pairwise_message::{Details, LocationInfo, PeerStart};
use pairwise_reactive::{Computation, Tracker, Value};
use tracing::debug;

use crate::error::PairingError;

/// One instance of the rendezvous protocol.
#[derive(Debug)]
pub struct PairingRequest {
    id: PairingId,
    locations: Vec<String>,
    ready: BTreeMap<String, Value<bool>>,
    info: BTreeMap<String, LocationInfo>,
    details: Details,
}

impl PairingRequest {
    pub fn new<I, S>(id: PairingId, tracker: &Tracker, locations: I, details: Details) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for location in locations {
            let location = location.into();
            if !ordered.contains(&location) {
                ordered.push(location);
            }
        }
        let ready = ordered
            .iter()
            .map(|l| (l.clone(), Value::new(tracker, false)))
            .collect();
        Self {
            id,
            locations: ordered,
            ready,
            info: BTreeMap::new(),
            details,
        }
    }

    pub fn id(&self) -> PairingId {
        self.id
    }

    /// Participating locations, in declaration order.
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    /// Marks `location` ready and records where its peer lives.
    ///
    /// Idempotent: repeating the call does not signal a second change.
    /// Returns true if the location was not ready before.
    pub fn set_location_ready(
        &mut self,
        location: &str,
        uri: impl Into<String>,
        role: Option<String>,
    ) -> Result<bool, PairingError> {
        let cell = self
            .ready
            .get_mut(location)
            .ok_or_else(|| PairingError::UnknownLocation {
                id: self.id,
                location: location.to_string(),
            })?;
        self.info.insert(
            location.to_string(),
            LocationInfo {
                uri: uri.into(),
                role,
            },
        );
        Ok(cell.set(true))
    }

    pub fn is_location_ready(&self, location: &str) -> bool {
        self.ready.get(location).is_some_and(|cell| *cell.peek())
    }

    /// True iff every declared location is ready. Subscribes `computation`
    /// to every readiness cell when given.
    pub fn ready(&self, computation: Option<&Computation>) -> bool {
        self.ready
            .values()
            .fold(true, |all, cell| cell.get(computation) && all)
    }

    /// Locations that have not reported yet.
    pub fn pending(&self) -> Vec<&str> {
        self.locations
            .iter()
            .filter(|l| !self.is_location_ready(l))
            .map(String::as_str)
            .collect()
    }

    /// Where the peer of `location` lives, once it reported.
    pub fn location_info(&self, location: &str) -> Option<&LocationInfo> {
        self.info.get(location)
    }

    /// The activation payload: `{locations: {location -> {uri, role}}, details}`.
    pub fn serialize(&self) -> PeerStart {
        PeerStart {
            locations: self.info.clone(),
            details: self.details.clone(),
        }
    }
}

/// Every pending pairing of one session plus the barrier watching them.
#[derive(Debug)]
pub struct PairingTable {
    tracker: Tracker,
    barrier: Computation,
    locations: Vec<String>,
    pending: BTreeMap<PairingId, PairingRequest>,
    ids: PairingIdAllocator,
}

impl PairingTable {
    /// A table for a session spanning `locations`.
    pub fn new<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tracker = Tracker::new();
        let barrier = tracker.computation();
        Self {
            tracker,
            barrier,
            locations: locations.into_iter().map(Into::into).collect(),
            pending: BTreeMap::new(),
            ids: PairingIdAllocator::new(),
        }
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    fn insert(&mut self, id: PairingId, details: Details) {
        let request = PairingRequest::new(id, &self.tracker, self.locations.clone(), details);
        self.pending.insert(id, request);
        // The barrier has to look at the new request even if nothing it
        // currently depends on changes.
        self.barrier.invalidate();
    }

    /// Opens the session-wide pairing (id `0`).
    pub fn open_session(&mut self) -> PairingId {
        self.insert(PairingId::SESSION, Details::new());
        PairingId::SESSION
    }

    /// Opens a dynamic pairing with a fresh id.
    pub fn open(&mut self, details: Details) -> PairingId {
        let id = self.ids.next_id();
        self.insert(id, details);
        id
    }

    /// Records a `peer_ready` for pairing `id`.
    pub fn set_ready(
        &mut self,
        id: PairingId,
        location: &str,
        uri: impl Into<String>,
        role: Option<String>,
    ) -> Result<bool, PairingError> {
        let request = self
            .pending
            .get_mut(&id)
            .ok_or(PairingError::UnknownPairing(id))?;
        request.set_location_ready(location, uri, role)
    }

    /// True if the barrier must be evaluated.
    pub fn is_dirty(&self) -> bool {
        self.barrier.is_dirty()
    }

    /// Runs the barrier: removes and returns every request that is ready,
    /// in id order. Does nothing unless the barrier is dirty.
    pub fn evaluate(&mut self) -> Vec<PairingRequest> {
        if self.tracker.drain_dirty().is_empty() {
            return Vec::new();
        }
        let released: Vec<PairingId> = self
            .pending
            .iter()
            .filter(|(_, request)| request.ready(Some(&self.barrier)))
            .map(|(id, _)| *id)
            .collect();
        debug!(pending = self.pending.len(), released = released.len(), "Barrier evaluated");
        released
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect()
    }

    /// Drops a pending request without releasing it.
    pub fn cancel(&mut self, id: PairingId) -> Option<PairingRequest> {
        self.pending.remove(&id)
    }

    pub fn pending(&self, id: PairingId) -> Option<&PairingRequest> {
        self.pending.get(&id)
    }

    pub fn pending_ids(&self) -> Vec<PairingId> {
        self.pending.keys().copied().collect()
    }

    /// The most recently issued dynamic id.
    pub fn last_issued(&self) -> Option<PairingId> {
        self.ids.last_issued()
    }

    /// Stops the barrier for good.
    pub fn close(&mut self) {
        self.barrier.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn locations(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("loc{i}")).collect()
    }

    #[test]
    fn test_request_ready_and_serialize() {
        let tracker = Tracker::new();
        let mut request =
            PairingRequest::new(PairingId::SESSION, &tracker, ["server", "client"], Details::new());
        assert!(!request.ready(None));
        assert_eq!(request.pending(), vec!["server", "client"]);

        assert!(request
            .set_location_ready("server", "app.1.server", Some("controller".into()))
            .unwrap());
        assert!(!request.ready(None));
        request
            .set_location_ready("client", "app.1.client", None)
            .unwrap();
        assert!(request.ready(None));

        let payload = request.serialize();
        assert_eq!(payload.locations["server"].uri, "app.1.server");
        assert_eq!(payload.locations["client"].role, None);
        assert_eq!(payload.peers().len(), 1);
    }

    #[test]
    fn test_request_rejects_unknown_location() {
        let tracker = Tracker::new();
        let mut request =
            PairingRequest::new(PairingId::new(3), &tracker, ["server"], Details::new());
        assert_eq!(
            request.set_location_ready("elsewhere", "x", None),
            Err(PairingError::UnknownLocation {
                id: PairingId::new(3),
                location: "elsewhere".to_string()
            })
        );
    }

    #[test]
    fn test_single_location_session_releases_on_first_evaluation() {
        let mut table = PairingTable::new(["server"]);
        table.open_session();
        table.set_ready(PairingId::SESSION, "server", "app.1.server", None).unwrap();

        let released = table.evaluate();
        assert_eq!(released.len(), 1);
        assert!(released[0].id().is_session());
        assert!(table.pending_ids().is_empty());
    }

    #[test]
    fn test_unknown_pairing_after_release() {
        let mut table = PairingTable::new(["server"]);
        table.open_session();
        table.set_ready(PairingId::SESSION, "server", "app.1.server", None).unwrap();
        table.evaluate();

        assert_eq!(
            table.set_ready(PairingId::SESSION, "server", "app.1.server", None),
            Err(PairingError::UnknownPairing(PairingId::SESSION))
        );
    }

    #[test]
    fn test_dynamic_ids_never_reused() {
        let mut table = PairingTable::new(["server", "client"]);
        let first = table.open(Details::new());
        table.cancel(first);
        let second = table.open(Details::new());

        assert_eq!(first, PairingId::new(1));
        assert!(second > first);
        assert_eq!(table.last_issued(), Some(second));
    }

    #[test]
    fn test_open_invalidates_idle_barrier() {
        let mut table = PairingTable::new(["server", "client"]);
        table.open_session();
        assert!(table.evaluate().is_empty());
        assert!(!table.is_dirty());

        table.open(Details::new());
        assert!(table.is_dirty());
    }

    #[test]
    fn test_closed_table_never_fires() {
        let mut table = PairingTable::new(["server"]);
        table.open_session();
        table.close();
        table.set_ready(PairingId::SESSION, "server", "app.1.server", None).unwrap();
        assert!(table.evaluate().is_empty());
    }

    proptest! {
        /// Repeated `peer_ready`s land anywhere in the delivery order, also
        /// before the last location reports. The request is still released
        /// once, right when the last distinct location turns ready, and its
        /// payload keeps every location's `{uri, role}`.
        #[test]
        fn prop_barrier_fires_exactly_once(
            order in (1usize..6).prop_flat_map(|n| {
                let all: Vec<usize> = (0..n).collect();
                (
                    Just(n),
                    Just(all).prop_shuffle(),
                    proptest::collection::vec((0..n, any::<proptest::sample::Index>()), 0..6),
                )
            }),
        ) {
            let (n, permutation, repeats) = order;
            let locs = locations(n);
            let mut table = PairingTable::new(locs.clone());
            let id = table.open(Details::new());
            prop_assert!(table.evaluate().is_empty());

            let mut deliveries: Vec<usize> = permutation;
            for (index, position) in repeats {
                let at = position.index(deliveries.len() + 1);
                deliveries.insert(at, index);
            }

            let mut seen = std::collections::HashSet::new();
            let expected = deliveries
                .iter()
                .position(|index| {
                    seen.insert(*index);
                    seen.len() == n
                })
                .unwrap();

            let mut fired_at = Vec::new();
            let mut released = Vec::new();
            let mut reported = std::collections::HashSet::new();
            for (step, index) in deliveries.iter().enumerate() {
                let location = &locs[*index];
                let uri = format!("app.1.{location}");
                let role = Some(format!("role{index}"));
                match table.set_ready(id, location, uri, role) {
                    Ok(_) => {}
                    Err(PairingError::UnknownPairing(_)) => {
                        prop_assert!(!fired_at.is_empty());
                        continue;
                    }
                    Err(e) => return Err(TestCaseError::fail(e.to_string())),
                }
                reported.insert(*index);
                let batch = table.evaluate();
                if batch.is_empty() {
                    prop_assert_eq!(table.pending_ids(), vec![id]);
                } else {
                    prop_assert_eq!(batch.len(), 1);
                    prop_assert_eq!(reported.len(), n);
                    fired_at.push(step);
                    released.extend(batch);
                }
            }

            prop_assert_eq!(fired_at, vec![expected]);
            let payload = released[0].serialize();
            prop_assert_eq!(payload.locations.len(), n);
            for (index, location) in locs.iter().enumerate() {
                let info = &payload.locations[location];
                prop_assert_eq!(&info.uri, &format!("app.1.{location}"));
                prop_assert_eq!(&info.role, &Some(format!("role{index}")));
            }
        }
    }
}
