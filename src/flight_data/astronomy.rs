//! Moon phase imagery for the sky decoration.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use bevy::log::{debug, warn};

use crate::config::AstronomyConfig;
use crate::error::FlightDataError;

#[derive(Deserialize)]
struct StudioResponse {
    data: StudioData,
}

#[derive(Deserialize)]
struct StudioData {
    #[serde(rename = "imageUrl")]
    image_url: String,
}

/// A rendered moon phase image and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MoonImage {
    pub url: String,
    pub bytes: Vec<u8>,
}

pub struct AstronomyClient {
    http: reqwest::Client,
    api_url: String,
    credentials: Option<(String, String)>,
}

impl AstronomyClient {
    pub fn new(config: &AstronomyConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client ({}), using defaults", e);
                reqwest::Client::new()
            });
        let credentials = match (&config.application_id, &config.application_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        };
        Self {
            http,
            api_url: config.api_url.clone(),
            credentials,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// URL of a rendered moon phase image for an observer and date.
    /// `Ok(None)` when no application credentials are configured.
    pub async fn fetch_moon_texture_url(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Option<String>, FlightDataError> {
        let Some((id, secret)) = &self.credentials else {
            debug!("Astronomy credentials not configured, skipping moon texture");
            return Ok(None);
        };

        let body = json!({
            "format": "png",
            "style": {
                "moonStyle": "default",
                "backgroundStyle": "solid",
                "backgroundColor": "transparent",
            },
            "observer": {
                "latitude": latitude,
                "longitude": longitude,
                "date": date.format("%Y-%m-%d").to_string(),
            },
            "view": { "type": "portrait-simple" },
        });

        let response = self
            .http
            .post(&self.api_url)
            .basic_auth(id, Some(secret))
            .json(&body)
            .send()
            .await
            .map_err(FlightDataError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(FlightDataError::Status {
                status: response.status().as_u16(),
                url: self.api_url.clone(),
            });
        }

        let parsed: StudioResponse = response
            .json()
            .await
            .map_err(|e| FlightDataError::Data(e.to_string()))?;
        Ok(Some(parsed.data.image_url))
    }

    /// Look up the moon phase image and download it.
    pub async fn fetch_moon_texture(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Option<MoonImage>, FlightDataError> {
        let Some(url) = self
            .fetch_moon_texture_url(latitude, longitude, date)
            .await?
        else {
            return Ok(None);
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(FlightDataError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(FlightDataError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(FlightDataError::from_reqwest)?;
        Ok(Some(MoonImage {
            url,
            bytes: bytes.to_vec(),
        }))
    }
}
