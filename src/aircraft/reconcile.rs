//! Keeps the rendered aircraft set equal to the latest snapshot.

use std::collections::{HashMap, HashSet};

use crate::flight_data::AircraftState;

/// Scene operations the reconciler needs. Implemented over Bevy `Commands`
/// in the app and by a recording fake in tests.
pub trait SceneEntities {
    type Handle: Copy;

    fn spawn_aircraft(&mut self, aircraft: &AircraftState) -> Self::Handle;
    /// Move/re-orient/relabel an existing entity without recreating it.
    fn update_aircraft(&mut self, handle: Self::Handle, aircraft: &AircraftState);
    fn despawn_aircraft(&mut self, handle: Self::Handle);
}

/// What a reconcile pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    /// Ids whose entity was destroyed
    pub removed: Vec<String>,
}

impl ReconcileStats {
    /// Entities created or destroyed.
    pub fn churn(&self) -> usize {
        self.created + self.removed.len()
    }
}

/// Owns the id -> view entity mapping. At most one entity per id.
#[derive(Debug)]
pub struct AircraftReconciler<H> {
    entities: HashMap<String, H>,
}

impl<H> Default for AircraftReconciler<H> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
}

impl<H: Copy> AircraftReconciler<H> {
    /// Make the entity set match `snapshot` exactly.
    ///
    /// Entities for ids missing from the snapshot are destroyed, existing ones
    /// are updated in place and new ids get a fresh entity. With duplicate ids
    /// the last occurrence wins.
    pub fn reconcile<S>(&mut self, scene: &mut S, snapshot: &[AircraftState]) -> ReconcileStats
    where
        S: SceneEntities<Handle = H>,
    {
        let mut stats = ReconcileStats::default();

        // Index of the last occurrence of each id
        let latest: HashMap<&str, usize> = snapshot
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.as_str(), i))
            .collect();
        let fresh_ids: HashSet<&str> = latest.keys().copied().collect();

        let stale: Vec<String> = self
            .entities
            .keys()
            .filter(|id| !fresh_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(handle) = self.entities.remove(&id) {
                scene.despawn_aircraft(handle);
                stats.removed.push(id);
            }
        }

        for (i, aircraft) in snapshot.iter().enumerate() {
            if latest.get(aircraft.id.as_str()) != Some(&i) {
                continue;
            }
            match self.entities.get(&aircraft.id) {
                Some(&handle) => {
                    scene.update_aircraft(handle, aircraft);
                    stats.updated += 1;
                }
                None => {
                    let handle = scene.spawn_aircraft(aircraft);
                    self.entities.insert(aircraft.id.clone(), handle);
                    stats.created += 1;
                }
            }
        }

        stats
    }

    /// Destroy every entity and forget the mapping. Returns how many were
    /// destroyed.
    pub fn teardown<S>(&mut self, scene: &mut S) -> usize
    where
        S: SceneEntities<Handle = H>,
    {
        let count = self.entities.len();
        for (_, handle) in self.entities.drain() {
            scene.despawn_aircraft(handle);
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<H> {
        self.entities.get(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::flight_data::Position;

    /// Scene fake that keeps live entities and counts operations.
    #[derive(Default)]
    pub struct RecordingScene {
        next: u32,
        pub live: HashMap<u32, Position>,
        pub spawned: usize,
        pub updated: usize,
        pub despawned: usize,
    }

    impl SceneEntities for RecordingScene {
        type Handle = u32;

        fn spawn_aircraft(&mut self, aircraft: &AircraftState) -> u32 {
            self.next += 1;
            self.spawned += 1;
            self.live.insert(self.next, aircraft.position);
            self.next
        }

        fn update_aircraft(&mut self, handle: u32, aircraft: &AircraftState) {
            self.updated += 1;
            assert!(self.live.contains_key(&handle), "update of a dead entity");
            self.live.insert(handle, aircraft.position);
        }

        fn despawn_aircraft(&mut self, handle: u32) {
            self.despawned += 1;
            assert!(self.live.remove(&handle).is_some(), "double despawn");
        }
    }
}
