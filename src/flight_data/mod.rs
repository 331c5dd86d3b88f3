//! Live aircraft feed: OpenSky client, fetch worker and the pipeline that
//! applies fetched snapshots to the store and the scene.

pub mod astronomy;
pub mod client;
pub mod model;
pub mod worker;

pub use astronomy::{AstronomyClient, MoonImage};
pub use client::{Credentials, OpenSkyClient};
pub use model::{AircraftState, Position, TrackPoint};
pub use worker::{FetchOutcome, FetchRequest, FetchWorker};

use bevy::prelude::*;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::aircraft::{
    apply_snapshot, AircraftEntities, AircraftMeshes, AircraftReconciler, AircraftStore,
    CommandsScene, SceneEntities,
};
use crate::config::AppConfig;
use crate::error::FlightDataError;
use crate::geo::{GeoPoint, LocalFrame};
use crate::player::TargetLocation;
use crate::refresh::AutoRefresh;
use crate::session::SessionState;

/// Request to fetch the track of one aircraft (by ICAO24).
#[derive(Message, Debug, Clone)]
pub struct TrackRequested(pub String);

/// Status of the decorative moon texture lookup.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MoonTexture {
    #[default]
    NotRequested,
    Pending,
    /// No astronomy credentials configured
    Unavailable,
    Ready(String),
    Failed(String),
}

/// Sends states requests to the fetch worker, at most one at a time.
///
/// A trigger arriving while a request is in flight is dropped. The flag is
/// only cleared once the outcome has been applied to the store and scene, so
/// reconcile passes never overlap.
#[derive(Clone)]
pub struct FeedTrigger {
    requests: Option<UnboundedSender<FetchRequest>>,
    in_flight: Arc<AtomicBool>,
    center: Arc<Mutex<GeoPoint>>,
    radius_km: f64,
}

impl FeedTrigger {
    pub fn new(
        requests: Option<UnboundedSender<FetchRequest>>,
        center: GeoPoint,
        radius_km: f64,
    ) -> Self {
        Self {
            requests,
            in_flight: Arc::new(AtomicBool::new(false)),
            center: Arc::new(Mutex::new(center)),
            radius_km,
        }
    }

    /// Returns `Ok(false)` when the trigger was dropped because a fetch is
    /// still in flight.
    pub fn trigger(&self) -> Result<bool, FlightDataError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Fetch still in flight, dropping refresh trigger");
            return Ok(false);
        }

        let request = FetchRequest::States {
            center: self.center(),
            radius_km: self.radius_km,
        };
        match worker::submit_to(self.requests.as_ref(), request) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.in_flight.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark the in-flight fetch as fully applied.
    pub fn complete(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn center(&self) -> GeoPoint {
        *self.center.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_center(&self, center: GeoPoint) {
        *self.center.lock().unwrap_or_else(|e| e.into_inner()) = center;
    }
}

/// What the HUD shows about the feed, updated as outcomes are applied.
#[derive(Debug, Clone, Default)]
pub struct FeedStatus {
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub moon: MoonTexture,
    /// Downloaded moon image waiting to be handed to the sky
    pub moon_image: Option<Vec<u8>>,
}

/// Per-session feed state: the worker plus what the HUD shows about it.
#[derive(Resource)]
pub struct FlightFeed {
    worker: FetchWorker,
    pub trigger: FeedTrigger,
    pub status: FeedStatus,
}

impl FlightFeed {
    pub fn new(config: &AppConfig, center: GeoPoint) -> Self {
        let worker = FetchWorker::spawn(
            OpenSkyClient::from_config(config),
            AstronomyClient::new(&config.astronomy),
        );
        let trigger = FeedTrigger::new(worker.sender(), center, config.feed.search_radius_km);
        Self {
            worker,
            trigger,
            status: FeedStatus::default(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.trigger.is_in_flight()
    }

    pub fn request_track(&mut self, icao24: &str) {
        let request = FetchRequest::Track {
            icao24: icao24.to_string(),
        };
        if let Err(e) = self.worker.submit(request) {
            warn!("Could not request track for {}: {}", icao24, e);
        }
    }

    pub fn request_moon_texture(&mut self, date: chrono::NaiveDate) {
        let request = FetchRequest::MoonTexture {
            center: self.trigger.center(),
            date,
        };
        self.status.moon = match self.worker.submit(request) {
            Ok(()) => MoonTexture::Pending,
            Err(e) => MoonTexture::Failed(e.to_string()),
        };
    }
}

pub struct FlightDataPlugin;

impl Plugin for FlightDataPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<TrackRequested>()
            .add_systems(
                OnEnter(SessionState::Active),
                (start_feed, start_auto_refresh).chain(),
            )
            .add_systems(
                OnExit(SessionState::Active),
                (stop_auto_refresh, stop_feed).chain(),
            )
            .add_systems(
                Update,
                (
                    follow_target_location,
                    manual_refresh,
                    submit_track_requests,
                    apply_feed_outcomes,
                )
                    .chain()
                    .run_if(in_state(SessionState::Active)),
            );
    }
}

pub(crate) fn start_feed(mut commands: Commands, config: Res<AppConfig>, target: Res<TargetLocation>) {
    let center = target.0.unwrap_or_else(|| config.observer.location());
    let mut feed = FlightFeed::new(&config, center);
    feed.request_moon_texture(Utc::now().date_naive());
    info!(
        "Flight feed started around ({:.4}, {:.4}), radius {} km",
        center.latitude, center.longitude, config.feed.search_radius_km
    );
    commands.insert_resource(feed);
}

pub(crate) fn start_auto_refresh(
    feed: Res<FlightFeed>,
    config: Res<AppConfig>,
    mut refresh: ResMut<AutoRefresh>,
) {
    let trigger = feed.trigger.clone();
    refresh.start(
        move || trigger.trigger().map(|_| ()),
        Duration::from_millis(config.feed.refresh_interval_ms),
    );
}

pub(crate) fn stop_auto_refresh(mut refresh: ResMut<AutoRefresh>) {
    refresh.stop();
}

/// Dropping the feed shuts the worker down and aborts any fetch in flight.
pub(crate) fn stop_feed(mut commands: Commands) {
    commands.remove_resource::<FlightFeed>();
    info!("Flight feed stopped");
}

/// Keep the search box centered on the observer.
fn follow_target_location(target: Res<TargetLocation>, feed: Option<Res<FlightFeed>>) {
    let (Some(feed), Some(point)) = (feed, target.0) else {
        return;
    };
    if target.is_changed() {
        feed.trigger.set_center(point);
    }
}

/// R fetches now, unless a fetch is already running.
fn manual_refresh(
    keyboard: Res<ButtonInput<KeyCode>>,
    feed: Option<Res<FlightFeed>>,
    mut contexts: bevy_egui::EguiContexts,
) {
    let Some(feed) = feed else {
        return;
    };
    if contexts.ctx_mut().is_ok_and(|ctx| ctx.wants_keyboard_input()) {
        return;
    }
    if keyboard.just_pressed(KeyCode::KeyR) {
        if let Err(e) = feed.trigger.trigger() {
            warn!("Manual refresh failed: {}", e);
        }
    }
}

fn submit_track_requests(
    mut requests: MessageReader<TrackRequested>,
    feed: Option<ResMut<FlightFeed>>,
) {
    let Some(mut feed) = feed else {
        requests.clear();
        return;
    };
    for TrackRequested(icao24) in requests.read() {
        feed.request_track(icao24);
    }
}

/// Apply one finished fetch to the store, the scene and the feed status.
///
/// A good snapshot goes store -> reconcile -> removals and then releases the
/// in-flight flag. A failed one keeps the last data on screen, records the
/// error and releases the flag. Tracks for aircraft that already left are
/// dropped.
pub fn apply_outcome<S: SceneEntities>(
    outcome: FetchOutcome,
    trigger: &FeedTrigger,
    status: &mut FeedStatus,
    store: &mut AircraftStore,
    reconciler: &mut AircraftReconciler<S::Handle>,
    scene: &mut S,
) {
    match outcome {
        FetchOutcome::States(Ok(snapshot)) => {
            let stats = apply_snapshot(store, reconciler, scene, snapshot);
            if stats.churn() > 0 {
                debug!(
                    "Reconciled aircraft: {} new, {} updated, {} removed",
                    stats.created,
                    stats.updated,
                    stats.removed.len()
                );
            }
            status.last_updated = Some(Utc::now());
            status.last_error = None;
            trigger.complete();
        }
        FetchOutcome::States(Err(e)) => {
            if e.is_transport() {
                warn!("Flight data fetch failed: {}", e);
            } else {
                error!("Flight data fetch failed: {}", e);
            }
            status.last_error = Some(e.to_string());
            trigger.complete();
        }
        FetchOutcome::Track { icao24, result } => match result {
            Ok(track) => {
                let points = track.len();
                if store.set_track(&icao24, track) {
                    info!("Loaded track for {} ({} points)", icao24, points);
                } else {
                    debug!("Track for {} arrived after it left the area", icao24);
                }
            }
            Err(e) => {
                warn!("Track fetch for {} failed: {}", icao24, e);
                status.last_error = Some(e.to_string());
            }
        },
        FetchOutcome::MoonTexture(result) => {
            status.moon = match result {
                Ok(Some(image)) => {
                    info!(
                        "Moon texture downloaded from {} ({} bytes)",
                        image.url,
                        image.bytes.len()
                    );
                    status.moon_image = Some(image.bytes);
                    MoonTexture::Ready(image.url)
                }
                Ok(None) => MoonTexture::Unavailable,
                Err(e) => {
                    warn!("Failed to fetch moon texture: {}", e);
                    MoonTexture::Failed(e.to_string())
                }
            };
        }
    }
}

fn apply_feed_outcomes(
    mut commands: Commands,
    feed: Option<ResMut<FlightFeed>>,
    mut store: ResMut<AircraftStore>,
    mut entities: ResMut<AircraftEntities>,
    meshes: Res<AircraftMeshes>,
    frame: Res<LocalFrame>,
    config: Res<AppConfig>,
) {
    let Some(mut feed) = feed else {
        return;
    };
    let feed = &mut *feed;
    let mut scene = CommandsScene {
        commands: &mut commands,
        meshes: &meshes,
        frame: &frame,
        heading_offset_deg: config.feed.model_heading_offset_deg,
    };

    while let Some(outcome) = feed.worker.try_next() {
        apply_outcome(
            outcome,
            &feed.trigger,
            &mut feed.status,
            &mut store,
            &mut entities.0,
            &mut scene,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::reconcile::test_support::RecordingScene;
    use crate::aircraft::store::test_support::aircraft;
    use tokio::sync::mpsc;

    struct Pipeline {
        trigger: FeedTrigger,
        requests: mpsc::UnboundedReceiver<FetchRequest>,
        status: FeedStatus,
        store: AircraftStore,
        reconciler: AircraftReconciler<u32>,
        scene: RecordingScene,
    }

    impl Pipeline {
        fn new() -> Self {
            let (tx, requests) = mpsc::unbounded_channel();
            Self {
                trigger: FeedTrigger::new(Some(tx), GeoPoint::new(46.778, 6.6412), 100.0),
                requests,
                status: FeedStatus::default(),
                store: AircraftStore::default(),
                reconciler: AircraftReconciler::default(),
                scene: RecordingScene::default(),
            }
        }

        fn apply(&mut self, outcome: FetchOutcome) {
            apply_outcome(
                outcome,
                &self.trigger,
                &mut self.status,
                &mut self.store,
                &mut self.reconciler,
                &mut self.scene,
            );
        }
    }

    fn track_point() -> TrackPoint {
        TrackPoint {
            time: None,
            longitude: 6.6,
            latitude: 46.7,
            altitude: Some(1000.0),
            heading: None,
            on_ground: false,
        }
    }

    #[test]
    fn snapshot_reaches_store_and_scene_then_releases_trigger() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.trigger.trigger(), Ok(true));
        assert!(pipeline.requests.try_recv().is_ok());

        pipeline.apply(FetchOutcome::States(Ok(vec![
            aircraft("a", 6.7, 46.8),
            aircraft("b", 6.5, 46.7),
        ])));
        assert_eq!(pipeline.store.count(), 2);
        assert_eq!(pipeline.scene.live.len(), 2);
        assert!(pipeline.status.last_updated.is_some());
        assert!(!pipeline.trigger.is_in_flight());

        assert_eq!(pipeline.trigger.trigger(), Ok(true));
        pipeline.apply(FetchOutcome::States(Ok(vec![aircraft("b", 6.55, 46.75)])));
        assert_eq!(pipeline.store.count(), 1);
        assert!(pipeline.store.get("a").is_none());
        assert_eq!(pipeline.scene.live.len(), 1);
        assert_eq!(pipeline.scene.despawned, 1);
    }

    #[test]
    fn failed_fetch_keeps_last_snapshot_and_reports_error() {
        let mut pipeline = Pipeline::new();
        pipeline.trigger.trigger().unwrap();
        pipeline.apply(FetchOutcome::States(Ok(vec![
            aircraft("a", 6.7, 46.8),
            aircraft("b", 6.5, 46.7),
        ])));
        let updated = pipeline.status.last_updated;

        assert_eq!(pipeline.trigger.trigger(), Ok(true));
        pipeline.apply(FetchOutcome::States(Err(FlightDataError::Status {
            status: 503,
            url: "https://opensky-network.org/api/states/all".to_string(),
        })));

        assert_eq!(pipeline.store.count(), 2);
        assert_eq!(pipeline.scene.live.len(), 2);
        assert_eq!(pipeline.scene.despawned, 0);
        assert_eq!(pipeline.status.last_updated, updated);
        assert!(pipeline
            .status
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("503")));
        assert!(!pipeline.trigger.is_in_flight());
        assert_eq!(pipeline.trigger.trigger(), Ok(true));

        pipeline.apply(FetchOutcome::States(Ok(vec![aircraft("a", 6.7, 46.8)])));
        assert_eq!(pipeline.status.last_error, None);
    }

    #[test]
    fn track_for_departed_aircraft_is_ignored() {
        let mut pipeline = Pipeline::new();
        pipeline.apply(FetchOutcome::States(Ok(vec![aircraft("a", 6.7, 46.8)])));

        pipeline.apply(FetchOutcome::Track {
            icao24: "gone".to_string(),
            result: Ok(vec![track_point()]),
        });
        assert!(pipeline.store.get("gone").is_none());
        assert_eq!(pipeline.store.count(), 1);

        pipeline.apply(FetchOutcome::Track {
            icao24: "a".to_string(),
            result: Ok(vec![track_point(), track_point()]),
        });
        assert_eq!(pipeline.store.get("a").unwrap().track.len(), 2);
        assert_eq!(pipeline.status.last_error, None);
    }

    #[test]
    fn moon_image_is_kept_for_the_sky() {
        let mut pipeline = Pipeline::new();
        pipeline.apply(FetchOutcome::MoonTexture(Ok(Some(MoonImage {
            url: "https://widgets.astronomyapi.com/moon/abc.png".to_string(),
            bytes: vec![1, 2, 3],
        }))));
        assert_eq!(
            pipeline.status.moon,
            MoonTexture::Ready("https://widgets.astronomyapi.com/moon/abc.png".to_string())
        );
        assert_eq!(pipeline.status.moon_image, Some(vec![1, 2, 3]));

        pipeline.apply(FetchOutcome::MoonTexture(Ok(None)));
        assert_eq!(pipeline.status.moon, MoonTexture::Unavailable);
    }

    #[test]
    fn trigger_is_dropped_while_in_flight() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let trigger = FeedTrigger::new(Some(tx), GeoPoint::new(46.778, 6.6412), 100.0);

        assert_eq!(trigger.trigger(), Ok(true));
        assert_eq!(trigger.trigger(), Ok(false));
        assert!(trigger.is_in_flight());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        trigger.complete();
        assert_eq!(trigger.trigger(), Ok(true));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn request_uses_latest_center() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let trigger = FeedTrigger::new(Some(tx), GeoPoint::new(46.778, 6.6412), 25.0);
        trigger.set_center(GeoPoint::new(47.0, 8.0));

        trigger.trigger().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            FetchRequest::States {
                center: GeoPoint::new(47.0, 8.0),
                radius_km: 25.0
            }
        );
    }

    #[test]
    fn stopped_worker_releases_the_in_flight_flag() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let trigger = FeedTrigger::new(Some(tx), GeoPoint::default(), 100.0);

        assert_eq!(trigger.trigger(), Err(FlightDataError::WorkerStopped));
        assert!(!trigger.is_in_flight());

        let detached = FeedTrigger::new(None, GeoPoint::default(), 100.0);
        assert_eq!(detached.trigger(), Err(FlightDataError::WorkerStopped));
    }
}
