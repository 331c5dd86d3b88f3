//! Last known observer location, persisted between runs.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::geo::GeoPoint;
use crate::paths;

/// File name (and historical storage key) of the persisted location
pub const STORAGE_KEY: &str = "flight_sim_last_loc";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
struct StoredLocation {
    lat: f64,
    lng: f64,
}

#[derive(Resource, Debug, Clone)]
pub struct LocationStore {
    path: PathBuf,
}

impl LocationStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(STORAGE_KEY),
        }
    }

    /// Store in the app's data directory.
    pub fn in_data_dir() -> Self {
        Self::new(&paths::data_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved location. Unreadable or invalid content is logged and
    /// the file removed.
    pub fn load(&self) -> Option<GeoPoint> {
        let contents = fs::read_to_string(&self.path).ok()?;

        let parsed = serde_json::from_str::<StoredLocation>(&contents)
            .ok()
            .map(|s| GeoPoint::new(s.lat, s.lng))
            .filter(GeoPoint::is_valid);

        match parsed {
            Some(point) => {
                info!(
                    "Restored last location ({:.4}, {:.4})",
                    point.latitude, point.longitude
                );
                Some(point)
            }
            None => {
                warn!("Invalid stored location, clearing.");
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("Failed to remove {:?}: {}", self.path, e);
                }
                None
            }
        }
    }

    pub fn save(&self, point: GeoPoint) {
        if let Some(parent) = self.path.parent() {
            paths::ensure_dir(parent);
        }
        let stored = StoredLocation {
            lat: point.latitude,
            lng: point.longitude,
        };
        match serde_json::to_string(&stored) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!("Failed to persist location: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize location: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_lat_lng_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocationStore::new(dir.path());
        assert_eq!(store.load(), None);

        store.save(GeoPoint::new(46.778, 6.6412));
        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"{"lat":46.778,"lng":6.6412}"#);
        assert_eq!(store.load(), Some(GeoPoint::new(46.778, 6.6412)));
    }

    #[test]
    fn corrupt_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocationStore::new(dir.path());
        fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.load(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn out_of_range_location_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocationStore::new(dir.path());
        fs::write(store.path(), r#"{"lat":146.0,"lng":6.0}"#).unwrap();

        assert_eq!(store.load(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn save_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocationStore::new(&dir.path().join("nested"));
        store.save(GeoPoint::new(-33.9, 151.2));
        assert_eq!(store.load(), Some(GeoPoint::new(-33.9, 151.2)));
    }
}
