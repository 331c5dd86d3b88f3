use bevy::prelude::*;
use std::collections::HashMap;

use crate::flight_data::{AircraftState, TrackPoint};

/// Last known state of every tracked aircraft, keyed by ICAO24.
///
/// Pure data. Entries are only removed when the feed pipeline says so, driven
/// by snapshot membership.
#[derive(Resource, Default, Debug)]
pub struct AircraftStore {
    aircraft: HashMap<String, AircraftState>,
}

impl AircraftStore {
    /// Insert or overwrite each state wholesale. Later entries win.
    pub fn upsert_many(&mut self, states: impl IntoIterator<Item = AircraftState>) {
        for state in states {
            self.aircraft.insert(state.id.clone(), state);
        }
    }

    pub fn get(&self, id: &str) -> Option<&AircraftState> {
        self.aircraft.get(id)
    }

    /// All stored states, in no particular order.
    pub fn get_all(&self) -> impl Iterator<Item = &AircraftState> {
        self.aircraft.values()
    }

    pub fn remove(&mut self, id: &str) -> Option<AircraftState> {
        self.aircraft.remove(id)
    }

    pub fn clear(&mut self) {
        self.aircraft.clear();
    }

    pub fn count(&self) -> usize {
        self.aircraft.len()
    }

    /// Attach a fetched track. Returns `false` if the aircraft is not stored.
    pub fn set_track(&mut self, id: &str, track: Vec<TrackPoint>) -> bool {
        match self.aircraft.get_mut(id) {
            Some(state) => {
                state.track = track;
                true
            }
            None => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::aircraft;
    use super::*;

    #[test]
    fn upsert_overwrites_whole_record() {
        let mut store = AircraftStore::default();
        let mut first = aircraft("4b1805", 6.5, 46.5);
        first.squawk = Some("7000".to_string());
        store.upsert_many([first]);

        let second = aircraft("4b1805", 6.6, 46.6);
        store.upsert_many([second]);

        let stored = store.get("4b1805").unwrap();
        assert_eq!(stored.position.longitude, 6.6);
        // Not a partial merge: the squawk from the first record is gone
        assert_eq!(stored.squawk, None);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn last_duplicate_in_a_batch_wins() {
        let mut store = AircraftStore::default();
        store.upsert_many([aircraft("a", 1.0, 1.0), aircraft("a", 2.0, 2.0)]);
        assert_eq!(store.get("a").unwrap().position.longitude, 2.0);
    }

    #[test]
    fn remove_clear_and_count() {
        let mut store = AircraftStore::default();
        store.upsert_many([aircraft("a", 1.0, 1.0), aircraft("b", 2.0, 2.0)]);
        assert_eq!(store.count(), 2);
        assert_eq!(store.get_all().count(), 2);

        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.count(), 1);

        store.clear();
        assert_eq!(store.count(), 0);
        assert!(store.get("b").is_none());
    }

    #[test]
    fn set_track_requires_known_aircraft() {
        let mut store = AircraftStore::default();
        store.upsert_many([aircraft("a", 1.0, 1.0)]);
        let point = crate::flight_data::TrackPoint {
            time: None,
            longitude: 1.0,
            latitude: 1.0,
            altitude: Some(100.0),
            heading: None,
            on_ground: false,
        };

        assert!(store.set_track("a", vec![point.clone()]));
        assert_eq!(store.get("a").unwrap().track.len(), 1);
        assert!(!store.set_track("zzz", vec![point]));
    }
}
