//! The observer: a ground-level camera that follows the user's location and
//! can only look around while a session is active.

pub mod fov;
pub mod geolocation;
pub(crate) mod input;
pub mod location_store;
pub mod physics;
pub mod pose;

pub use fov::FieldOfView;
pub use geolocation::{
    FixedLocationProvider, GeolocationTracker, IpLocationProvider, LocationProvider, WatchHandle,
};
pub use location_store::LocationStore;
pub use physics::{FlatTerrain, HeadingReadout, TerrainSampler};
pub use pose::{CameraPose, CameraRig, ControllerCapabilities, PlayerCamera};

use bevy::prelude::*;
use bevy_egui::EguiContexts;
use std::time::Duration;

use crate::config::{AppConfig, LocationSource};
use crate::geo::{GeoPoint, LocalFrame};
use crate::session::SessionState;
use input::{DragState, EguiWantsPointer};

/// Culling distance of the observer camera, meters
const VIEW_DISTANCE_M: f32 = 500_000.0;

/// Where the observer stands. `None` until a location has been restored or
/// reported, in which case the configured observer location is used.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct TargetLocation(pub Option<GeoPoint>);

impl TargetLocation {
    pub fn or_observer(&self, config: &AppConfig) -> GeoPoint {
        self.0.unwrap_or_else(|| config.observer.location())
    }
}

/// Latest heading readout from camera physics, for the HUD.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct CameraReadout {
    pub heading: Option<HeadingReadout>,
}

fn location_provider(config: &AppConfig) -> Box<dyn LocationProvider> {
    match config.location.source {
        LocationSource::Ip => Box::new(IpLocationProvider::new(Duration::from_secs(
            config.location.poll_interval_secs.max(1),
        ))),
        LocationSource::Fixed => Box::new(FixedLocationProvider {
            point: config.observer.location(),
        }),
    }
}

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<AppConfig>()
            .cloned()
            .unwrap_or_default();

        let location_store = LocationStore::in_data_dir();
        let target = TargetLocation(location_store.load());
        let frame = LocalFrame::new(
            target.or_observer(&config),
            config.terrain.elevation_m.unwrap_or(config.observer.height),
        );

        app.insert_resource(location_store)
            .insert_resource(target)
            .insert_resource(frame)
            .insert_resource(FlatTerrain {
                elevation: config.terrain.elevation_m,
            })
            .insert_resource(GeolocationTracker::new(location_provider(&config)))
            .init_resource::<FieldOfView>()
            .init_resource::<CameraReadout>()
            .init_resource::<DragState>()
            .init_resource::<EguiWantsPointer>()
            .add_systems(
                OnEnter(SessionState::Active),
                (enter_observer_mode, start_geolocation),
            )
            .add_systems(
                OnExit(SessionState::Active),
                (stop_geolocation, release_camera),
            )
            .add_systems(
                Update,
                (
                    input::check_egui_wants_input,
                    (poll_geolocation, locate_on_key, follow_target)
                        .chain()
                        .run_if(in_state(SessionState::Active)),
                    input::handle_camera_input,
                    apply_camera_physics.run_if(in_state(SessionState::Active)),
                    input::sync_camera_transform,
                )
                    .chain(),
            );
    }
}

/// Spawn the observer camera on first entry, then lock it to look-only and
/// stand it at the target location.
fn enter_observer_mode(
    mut commands: Commands,
    mut cameras: Query<&mut PlayerCamera>,
    config: Res<AppConfig>,
    target: Res<TargetLocation>,
    terrain: Res<FlatTerrain>,
    frame: Res<LocalFrame>,
    fov: Res<FieldOfView>,
) {
    let location = target.or_observer(&config);

    if let Ok(mut camera) = cameras.single_mut() {
        camera.set_controller_mode(ControllerCapabilities::OBSERVER);
        let pose = physics::place_at_target(camera.pose(), location, terrain.as_ref());
        camera.set_pose(pose);
        return;
    }

    let observer = &config.observer;
    let initial = CameraPose::new(location.longitude, location.latitude, observer.height)
        .with_orientation(observer.heading.to_radians(), observer.pitch.to_radians(), 0.0);
    let pose = physics::place_at_target(initial, location, terrain.as_ref());

    commands.spawn((
        Name::new("Observer Camera"),
        Camera3d::default(),
        Projection::from(PerspectiveProjection {
            fov: fov.radians(),
            near: 0.5,
            far: VIEW_DISTANCE_M,
            ..default()
        }),
        pose.to_transform(&frame),
        PlayerCamera::new(pose, ControllerCapabilities::OBSERVER),
    ));
    info!(
        "Observer placed at ({:.4}, {:.4}), {:.0} m",
        pose.latitude, pose.longitude, pose.height
    );
}

/// Hand the camera back to the unrestricted controller.
fn release_camera(mut cameras: Query<&mut PlayerCamera>) {
    for mut camera in &mut cameras {
        camera.set_controller_mode(ControllerCapabilities::FREE);
    }
}

fn start_geolocation(mut tracker: ResMut<GeolocationTracker>) {
    tracker.start();
}

fn stop_geolocation(mut tracker: ResMut<GeolocationTracker>) {
    tracker.stop();
}

fn poll_geolocation(
    mut tracker: ResMut<GeolocationTracker>,
    mut target: ResMut<TargetLocation>,
    store: Res<LocationStore>,
) {
    let Some(point) = tracker.poll() else {
        return;
    };
    if target.0 != Some(point) {
        info!(
            "Observer location updated to ({:.4}, {:.4})",
            point.latitude, point.longitude
        );
        target.0 = Some(point);
        store.save(point);
    }
}

/// G asks for a fresh location fix.
fn locate_on_key(
    keyboard: Res<ButtonInput<KeyCode>>,
    tracker: Res<GeolocationTracker>,
    mut contexts: EguiContexts,
) {
    if contexts.ctx_mut().is_ok_and(|ctx| ctx.wants_keyboard_input()) {
        return;
    }
    if keyboard.just_pressed(KeyCode::KeyG) && !tracker.locate_now() {
        debug!("Locate ignored, no location watch running");
    }
}

/// Move the observer and recenter the world on a new target.
fn follow_target(
    target: Res<TargetLocation>,
    terrain: Res<FlatTerrain>,
    mut frame: ResMut<LocalFrame>,
    mut cameras: Query<&mut PlayerCamera>,
) {
    if !target.is_changed() {
        return;
    }
    let Some(point) = target.0 else {
        return;
    };

    for mut camera in &mut cameras {
        let pose = physics::place_at_target(camera.pose(), point, terrain.as_ref());
        camera.set_pose(pose);
    }
    if frame.origin != point {
        frame.origin = point;
    }
}

fn apply_camera_physics(
    mut cameras: Query<&mut PlayerCamera>,
    terrain: Res<FlatTerrain>,
    mut readout: ResMut<CameraReadout>,
) {
    for mut camera in &mut cameras {
        let tick = physics::step(&mut *camera, terrain.as_ref());
        readout.heading = Some(tick.readout);
    }
}
