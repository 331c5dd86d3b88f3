use bevy::prelude::*;
use bevy_egui::EguiPlugin;

mod aircraft;
mod config;
mod error;
mod flight_data;
mod geo;
mod hud;
mod paths;
mod player;
mod refresh;
mod session;
mod sky;

use aircraft::AircraftPlugin;
use config::{AppConfig, ConfigPlugin};
use flight_data::FlightDataPlugin;
use geo::LocalFrame;
use hud::HudPlugin;
use player::PlayerPlugin;
use refresh::RefreshPlugin;
use session::SessionPlugin;
use sky::SkyPlugin;

/// Side length of the ground plane, meters
const GROUND_SIZE_M: f32 = 400_000.0;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Skywalk - Live Aircraft Overhead".to_string(),
                    resolution: (1280, 720).into(),
                    ..default()
                }),
                ..default()
            }),
            EguiPlugin::default(),
            ConfigPlugin,
        ))
        .add_plugins((
            SessionPlugin,
            RefreshPlugin,
            PlayerPlugin,
            AircraftPlugin,
            FlightDataPlugin,
            SkyPlugin,
            HudPlugin,
        ))
        .insert_resource(ClearColor(Color::srgb(0.47, 0.66, 0.88)))
        .add_systems(Startup, setup_scene)
        .run();
}

/// Ground, sun and ambient light. Aircraft, the moon and the camera are
/// spawned by their plugins.
fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<AppConfig>,
    frame: Res<LocalFrame>,
) {
    let ground_height = config
        .terrain
        .elevation_m
        .unwrap_or(frame.origin_height - player::physics::EYE_OFFSET_M);

    commands.spawn((
        Name::new("Ground"),
        Mesh3d(meshes.add(Plane3d::default().mesh().size(GROUND_SIZE_M, GROUND_SIZE_M))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.33, 0.45, 0.28),
            perceptual_roughness: 0.95,
            ..default()
        })),
        Transform::from_xyz(0.0, (ground_height - frame.origin_height) as f32, 0.0),
    ));

    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            illuminance: 12_000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(0.0, 1.0, 0.0).looking_at(Vec3::new(0.4, 0.0, 0.6), Vec3::Y),
    ));

    commands.insert_resource(GlobalAmbientLight {
        color: Color::WHITE,
        brightness: 400.0,
        ..default()
    });
}
