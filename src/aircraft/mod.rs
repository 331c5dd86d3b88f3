pub mod plugin;
pub mod reconcile;
pub mod render;
pub mod store;

pub use plugin::*;
pub use reconcile::{AircraftReconciler, ReconcileStats, SceneEntities};
pub use render::*;
pub use store::AircraftStore;

use bevy::prelude::*;

use crate::flight_data::AircraftState;

/// Rendered aircraft entities, keyed by ICAO24.
#[derive(Resource, Default)]
pub struct AircraftEntities(pub AircraftReconciler<Entity>);

/// Feed one fetched snapshot through store and reconciler.
///
/// Tracks fetched earlier are carried onto the fresh records, the store is
/// updated, the scene reconciled and ids that left the snapshot are dropped
/// from the store.
pub fn apply_snapshot<S: SceneEntities>(
    store: &mut AircraftStore,
    reconciler: &mut AircraftReconciler<S::Handle>,
    scene: &mut S,
    mut snapshot: Vec<AircraftState>,
) -> ReconcileStats {
    for aircraft in snapshot.iter_mut().filter(|a| a.track.is_empty()) {
        if let Some(previous) = store.get(&aircraft.id) {
            aircraft.track = previous.track.clone();
        }
    }

    store.upsert_many(snapshot.iter().cloned());
    let stats = reconciler.reconcile(scene, &snapshot);
    for id in &stats.removed {
        store.remove(id);
    }
    stats
}

/// Destroy every aircraft entity and forget all aircraft.
pub fn teardown_aircraft<S: SceneEntities>(
    store: &mut AircraftStore,
    reconciler: &mut AircraftReconciler<S::Handle>,
    scene: &mut S,
) -> usize {
    store.clear();
    reconciler.teardown(scene)
}
