use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::geo::GeoPoint;
use crate::paths;

const CONFIG_FILE: &str = "config.toml";

#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub feed: FeedConfig,
    #[serde(default)]
    pub astronomy: AstronomyConfig,
    pub observer: ObserverConfig,
    #[serde(default)]
    pub terrain: TerrainConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FeedConfig {
    pub api_base_url: String,
    pub token_url: String,
    /// OAuth2 client id; the API is called anonymously when unset
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub refresh_interval_ms: u64,
    pub search_radius_km: f64,
    /// Corrects the aircraft model's forward axis to true north
    #[serde(default = "default_model_heading_offset")]
    pub model_heading_offset_deg: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AstronomyConfig {
    pub api_url: String,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub application_secret: Option<String>,
}

/// Default observer placement used when no location has been persisted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObserverConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Initial camera height in meters above the ellipsoid
    pub height: f64,
    /// Initial heading in degrees
    pub heading: f64,
    /// Initial pitch in degrees
    pub pitch: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TerrainConfig {
    /// Ground elevation in meters. Unset means terrain is unavailable and
    /// the camera keeps whatever height it has.
    pub elevation_m: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// Follow the machine's IP geolocation
    #[default]
    Ip,
    /// Stay at the configured observer location
    Fixed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LocationConfig {
    pub source: LocationSource,
    pub poll_interval_secs: u64,
}

fn default_model_heading_offset() -> f64 {
    -90.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig {
                api_base_url: "https://opensky-network.org/api".to_string(),
                token_url: "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token".to_string(),
                client_id: None,
                client_secret: None,
                refresh_interval_ms: 30_000,
                search_radius_km: 100.0,
                model_heading_offset_deg: default_model_heading_offset(),
            },
            astronomy: AstronomyConfig::default(),
            observer: ObserverConfig {
                name: "Yverdon-les-Bains".to_string(),
                latitude: 46.778,
                longitude: 6.6412,
                height: 437.0,
                heading: 180.0,
                pitch: 10.0,
            },
            terrain: TerrainConfig::default(),
            location: LocationConfig::default(),
        }
    }
}

impl Default for AstronomyConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.astronomyapi.com/api/v2/studio/moon-phase".to_string(),
            application_id: None,
            application_secret: None,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            elevation_m: Some(435.0),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            source: LocationSource::Ip,
            poll_interval_secs: 60,
        }
    }
}

impl ObserverConfig {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

impl AppConfig {
    /// Apply environment-style overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("OPENSKY_API_URL") {
            self.feed.api_base_url = url;
        }
        if let Some(url) = non_empty("OPENSKY_TOKEN_URL") {
            self.feed.token_url = url;
        }
        if let Some(id) = non_empty("OPENSKY_CLIENT_ID") {
            self.feed.client_id = Some(id);
        }
        if let Some(secret) = non_empty("OPENSKY_CLIENT_SECRET") {
            self.feed.client_secret = Some(secret);
        }
        if let Some(id) = non_empty("ASTRONOMY_APP_ID") {
            self.astronomy.application_id = Some(id);
        }
        if let Some(secret) = non_empty("ASTRONOMY_APP_SECRET") {
            self.astronomy.application_secret = Some(secret);
        }
        if let Some(radius) = non_empty("SKYWALK_RADIUS_KM") {
            match radius.parse::<f64>() {
                Ok(r) if r > 0.0 => self.feed.search_radius_km = r,
                _ => warn!("Ignoring invalid SKYWALK_RADIUS_KM={}", radius),
            }
        }
    }

    /// Both halves of the OpenSky client credentials, if configured.
    pub fn opensky_credentials(&self) -> Option<(String, String)> {
        match (&self.feed.client_id, &self.feed.client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }
}

fn config_path() -> PathBuf {
    paths::config_dir().join(CONFIG_FILE)
}

/// Load the config from the config directory, writing defaults when missing,
/// then apply environment overrides.
pub fn load_config() -> AppConfig {
    let mut config = load_config_from(&config_path());
    config.apply_overrides(|key| std::env::var(key).ok());
    config
}

pub(crate) fn load_config_from(path: &Path) -> AppConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    warn!("Failed to parse config: {}, using defaults", e);
                    return AppConfig::default();
                }
            },
            Err(e) => {
                warn!("Failed to read config: {}, using defaults", e);
                return AppConfig::default();
            }
        }
    }

    let config = AppConfig::default();
    save_config_to(&config, path);
    config
}

fn save_config_to(config: &AppConfig, path: &Path) {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent);
    }
    match toml::to_string_pretty(config) {
        Ok(contents) => {
            if let Err(e) = fs::write(path, contents) {
                error!("Failed to write config: {}", e);
            } else {
                info!("Saved config to {:?}", path);
            }
        }
        Err(e) => {
            error!("Failed to serialize config: {}", e);
        }
    }
}

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<AppConfig>() {
            app.insert_resource(load_config());
        }
    }
}
