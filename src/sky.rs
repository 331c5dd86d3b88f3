//! The moon in the observer's sky.
//!
//! Position comes from a low-precision lunar ephemeris (good to a few tenths
//! of a degree) evaluated against wall-clock time at the world origin. The
//! billboard starts as a plain disc and takes the rendered phase image once
//! the feed has downloaded it.

use bevy::asset::RenderAssetUsages;
use bevy::image::{CompressedImageFormats, ImageSampler, ImageType};
use bevy::prelude::*;
use chrono::{DateTime, Utc};

use crate::flight_data::FlightFeed;
use crate::geo::LocalFrame;

/// Distance of the moon billboard from the origin, inside the camera far plane
const MOON_DISTANCE_M: f32 = 450_000.0;

/// Apparent diameter of the billboard. About four times the real moon so the
/// phase stays readable.
const MOON_APPARENT_DIAMETER_DEG: f32 = 2.0;

/// Below this elevation the moon is hidden
const MOON_SET_ELEVATION_DEG: f64 = -1.0;

/// Unix timestamp of J2000.0 (2000-01-01 12:00 UTC)
const J2000_UNIX_SECS: f64 = 946_728_000.0;

const OBLIQUITY_DEG: f64 = 23.439;

/// Marker for the moon billboard.
#[derive(Component)]
pub struct Moon;

/// Current moon position as seen from the world origin.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct MoonState {
    /// Degrees above the horizon
    pub elevation: f64,
    /// Degrees clockwise from north
    pub azimuth: f64,
}

fn days_since_j2000(time: DateTime<Utc>) -> f64 {
    let secs = time.timestamp() as f64 + f64::from(time.timestamp_subsec_millis()) / 1000.0;
    (secs - J2000_UNIX_SECS) / 86_400.0
}

/// Geocentric ecliptic longitude and latitude of the moon, degrees.
pub fn moon_ecliptic_position(time: DateTime<Utc>) -> (f64, f64) {
    let d = days_since_j2000(time);

    let mean_lon = 218.316 + 13.176_396 * d;
    let anomaly = (134.963 + 13.064_993 * d).to_radians();
    let sun_anomaly = (357.529 + 0.985_600_3 * d).to_radians();
    let elongation = (297.850 + 12.190_749 * d).to_radians();
    let node_arg = (93.272 + 13.229_350 * d).to_radians();

    let longitude = mean_lon + 6.289 * anomaly.sin() - 1.274 * (anomaly - 2.0 * elongation).sin()
        + 0.658 * (2.0 * elongation).sin()
        + 0.214 * (2.0 * anomaly).sin()
        - 0.186 * sun_anomaly.sin()
        - 0.114 * (2.0 * node_arg).sin();
    let latitude = 5.128 * node_arg.sin() + 0.280 * (anomaly + node_arg).sin()
        - 0.280 * (node_arg - anomaly).sin()
        - 0.173 * (node_arg - 2.0 * elongation).sin();

    (longitude.rem_euclid(360.0), latitude)
}

/// Elevation and azimuth (degrees) of an object at right ascension `ra` and
/// declination `dec` for an observer at `latitude`, given the local sidereal
/// time. All inputs in degrees.
pub fn equatorial_to_horizontal(ra: f64, dec: f64, latitude: f64, sidereal: f64) -> (f64, f64) {
    let hour_angle = (sidereal - ra).to_radians();
    let dec = dec.to_radians();
    let lat = latitude.to_radians();

    let sin_elevation = lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos();
    let elevation = sin_elevation.clamp(-1.0, 1.0).asin();

    // Measured from south, westward; shifted to a compass bearing
    let azimuth = hour_angle
        .sin()
        .atan2(hour_angle.cos() * lat.sin() - dec.tan() * lat.cos())
        .to_degrees()
        + 180.0;

    (elevation.to_degrees(), azimuth.rem_euclid(360.0))
}

/// Moon elevation and azimuth in degrees for an observer at the given
/// position. Geocentric, so up to about a degree off near the horizon.
pub fn compute_moon_position(latitude: f64, longitude: f64, time: DateTime<Utc>) -> (f64, f64) {
    let (lambda, beta) = moon_ecliptic_position(time);
    let (lambda, beta) = (lambda.to_radians(), beta.to_radians());
    let obliquity = OBLIQUITY_DEG.to_radians();

    let ra = (lambda.sin() * obliquity.cos() - beta.tan() * obliquity.sin())
        .atan2(lambda.cos())
        .to_degrees();
    let dec = (beta.sin() * obliquity.cos() + beta.cos() * obliquity.sin() * lambda.sin())
        .asin()
        .to_degrees();

    let gmst = 280.460_618_37 + 360.985_647_366_29 * days_since_j2000(time);
    equatorial_to_horizontal(ra, dec, latitude, gmst + longitude)
}

/// World-space direction (x east, y up, -z north) for an elevation and azimuth.
pub fn sky_direction(elevation_deg: f64, azimuth_deg: f64) -> Vec3 {
    let (elevation, azimuth) = (elevation_deg.to_radians(), azimuth_deg.to_radians());
    Vec3::new(
        (elevation.cos() * azimuth.sin()) as f32,
        elevation.sin() as f32,
        -(elevation.cos() * azimuth.cos()) as f32,
    )
}

fn spawn_moon(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let size = 2.0 * MOON_DISTANCE_M * (MOON_APPARENT_DIAMETER_DEG.to_radians() / 2.0).tan();
    commands.spawn((
        Name::new("Moon"),
        Moon,
        Mesh3d(meshes.add(Rectangle::new(size, size))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.93, 0.92, 0.85),
            unlit: true,
            ..default()
        })),
        Transform::from_xyz(0.0, MOON_DISTANCE_M, 0.0),
        Visibility::Hidden,
    ));
}

/// Place the billboard along the moon's direction, facing the origin.
fn update_moon_position(
    frame: Res<LocalFrame>,
    mut state: ResMut<MoonState>,
    mut moon: Query<(&mut Transform, &mut Visibility), With<Moon>>,
) {
    let (elevation, azimuth) =
        compute_moon_position(frame.origin.latitude, frame.origin.longitude, Utc::now());
    state.elevation = elevation;
    state.azimuth = azimuth;

    let Ok((mut transform, mut visibility)) = moon.single_mut() else {
        return;
    };
    let position = sky_direction(elevation, azimuth) * MOON_DISTANCE_M;
    // The quad's front (+Z) must face the origin
    *transform = Transform::from_translation(position).looking_at(position * 2.0, Vec3::Y);
    *visibility = if elevation > MOON_SET_ELEVATION_DEG {
        Visibility::Visible
    } else {
        Visibility::Hidden
    };
}

/// Swap the plain disc for the downloaded phase image.
fn apply_moon_texture(
    feed: Option<ResMut<FlightFeed>>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut moon: Query<&mut MeshMaterial3d<StandardMaterial>, With<Moon>>,
) {
    let Some(mut feed) = feed else {
        return;
    };
    let Some(bytes) = feed.status.moon_image.take() else {
        return;
    };

    let image = match Image::from_buffer(
        &bytes,
        ImageType::Extension("png"),
        CompressedImageFormats::NONE,
        true,
        ImageSampler::Default,
        RenderAssetUsages::default(),
    ) {
        Ok(image) => image,
        Err(e) => {
            warn!("Could not decode moon texture: {}", e);
            return;
        }
    };

    let texture = images.add(image);
    for mut material in &mut moon {
        material.0 = materials.add(StandardMaterial {
            base_color_texture: Some(texture.clone()),
            alpha_mode: AlphaMode::Blend,
            unlit: true,
            ..default()
        });
    }
    info!("Moon texture applied");
}

pub struct SkyPlugin;

impl Plugin for SkyPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MoonState>()
            .add_systems(Startup, spawn_moon)
            .add_systems(Update, (update_moon_position, apply_moon_texture));
    }
}
