//! OpenSky REST client.
//!
//! Owns the OAuth2 access token. The client is only ever driven from the
//! fetch worker through `&mut self`, so the token cache needs no lock.

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use bevy::log::{debug, info, warn};

use super::model::{self, AircraftState, TrackPoint};
use crate::config::AppConfig;
use crate::error::FlightDataError;
use crate::geo::{bounding_box, BoundingBox, GeoPoint};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// OAuth2 client credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub struct OpenSkyClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    credentials: Option<Credentials>,
    token: Option<String>,
    token_exchanges: u32,
}

impl OpenSkyClient {
    pub fn new(
        api_base: impl Into<String>,
        token_url: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            credentials,
            token: None,
            token_exchanges: 0,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let credentials = config
            .opensky_credentials()
            .map(|(client_id, client_secret)| Credentials {
                client_id,
                client_secret,
            });
        if credentials.is_none() {
            info!("No OpenSky credentials configured, using anonymous access");
        }
        Self::new(&config.feed.api_base_url, &config.feed.token_url, credentials)
    }

    /// Number of token exchanges performed so far.
    pub fn token_exchanges(&self) -> u32 {
        self.token_exchanges
    }

    pub fn has_cached_token(&self) -> bool {
        self.token.is_some()
    }

    /// Fetch the state vectors inside a `radius_km` box around an observer.
    pub async fn fetch_states(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Result<Vec<AircraftState>, FlightDataError> {
        if !GeoPoint::new(latitude, longitude).is_valid() {
            return Err(FlightDataError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        let bbox = bounding_box(latitude, longitude, radius_km);
        let url = format!("{}/states/all", self.api_base);
        let response = self.get(&url, &bbox_query(&bbox)).await?;
        let body = json_body(check_status(response, &url)?).await?;
        let states = model::parse_states(&body)?;
        debug!("Fetched {} aircraft states", states.len());
        Ok(states)
    }

    /// Fetch the most recent track of one aircraft. No known track is an
    /// empty path, not an error.
    pub async fn fetch_track(&mut self, icao24: &str) -> Result<Vec<TrackPoint>, FlightDataError> {
        let url = format!("{}/tracks/all", self.api_base);
        let query = [
            ("icao24", icao24.to_lowercase()),
            ("time", "0".to_string()),
        ];
        let response = self.get(&url, &query).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = json_body(check_status(response, &url)?).await?;
        model::parse_track(&body)
    }

    /// GET with bearer auth. A 401 drops the cached token, re-authenticates
    /// and retries exactly once.
    async fn get(&mut self, url: &str, query: &[(&str, String)]) -> Result<Response, FlightDataError> {
        let mut retried = false;
        loop {
            let mut request = self.http.get(url).query(query);
            if let Some(token) = self.bearer_token().await? {
                request = request.bearer_auth(token);
            }
            let response = request.send().await.map_err(FlightDataError::from_reqwest)?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            if self.credentials.is_none() {
                return Err(FlightDataError::Auth(
                    "request unauthorized and no client credentials are configured".to_string(),
                ));
            }

            self.token = None;
            if retried {
                return Err(FlightDataError::Auth(
                    "request still unauthorized after re-authentication".to_string(),
                ));
            }
            warn!("OpenSky rejected the access token, re-authenticating");
            retried = true;
        }
    }

    /// Cached access token, exchanging credentials when there is none.
    /// `None` when running anonymously.
    async fn bearer_token(&mut self) -> Result<Option<String>, FlightDataError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }

        self.token_exchanges += 1;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FlightDataError::Auth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FlightDataError::Auth(format!(
                "token endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| FlightDataError::Auth(format!("unreadable token response: {}", e)))?
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FlightDataError::Auth("token response has no access_token".to_string()))?;

        debug!("Obtained OpenSky access token");
        self.token = Some(token.clone());
        Ok(Some(token))
    }
}

fn bbox_query(bbox: &BoundingBox) -> [(&'static str, String); 4] {
    [
        ("lamin", format!("{:.4}", bbox.lamin)),
        ("lomin", format!("{:.4}", bbox.lomin)),
        ("lamax", format!("{:.4}", bbox.lamax)),
        ("lomax", format!("{:.4}", bbox.lomax)),
    ]
}

fn check_status(response: Response, url: &str) -> Result<Response, FlightDataError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(FlightDataError::Status {
            status: response.status().as_u16(),
            url: url.to_string(),
        })
    }
}

async fn json_body(response: Response) -> Result<Value, FlightDataError> {
    let bytes = response.bytes().await.map_err(FlightDataError::from_reqwest)?;
    serde_json::from_slice(&bytes).map_err(|e| FlightDataError::Data(e.to_string()))
}
