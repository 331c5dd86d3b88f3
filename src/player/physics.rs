//! Per-frame camera constraints: keep the observer level, limit pitch and
//! stand them on the ground.

use bevy::prelude::*;

use super::pose::{CameraPose, CameraRig};
use crate::geo::{normalize_degrees, GeoPoint};

/// Eye level above the ground, meters
pub const EYE_OFFSET_M: f64 = 2.0;

/// Height error tolerated before the camera is snapped back to eye level
pub const HEIGHT_TOLERANCE_M: f64 = 0.5;

/// Roll below this (radians) counts as level
pub const ROLL_TOLERANCE_RAD: f64 = 1e-4;

pub const MIN_PITCH_DEG: f64 = -30.0;
pub const MAX_PITCH_DEG: f64 = 85.0;

pub const COMPASS_LABELS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Ground elevation lookup. `None` means no terrain data at that point, in
/// which case height corrections are skipped.
pub trait TerrainSampler {
    fn height_at(&self, longitude: f64, latitude: f64) -> Option<f64>;
}

/// Terrain with a single configured elevation everywhere.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct FlatTerrain {
    pub elevation: Option<f64>,
}

impl TerrainSampler for FlatTerrain {
    fn height_at(&self, _longitude: f64, _latitude: f64) -> Option<f64> {
        self.elevation
    }
}

/// Compass label nearest to a heading in degrees.
pub fn compass_label(heading_deg: f64) -> &'static str {
    let sector = (normalize_degrees(heading_deg) / 45.0).round() as usize % COMPASS_LABELS.len();
    COMPASS_LABELS[sector]
}

/// Heading readouts derived from the corrected pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingReadout {
    /// Heading in `[0, 360)`
    pub degrees: f64,
    /// Rounded for display
    pub angle: u32,
    pub label: &'static str,
}

impl HeadingReadout {
    pub fn from_heading(heading_rad: f64) -> Self {
        let degrees = normalize_degrees(heading_rad.to_degrees());
        Self {
            degrees,
            angle: degrees.round() as u32 % 360,
            label: compass_label(degrees),
        }
    }
}

/// Which corrections a tick applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Corrections {
    pub roll: bool,
    pub pitch: bool,
    pub height: bool,
}

impl Corrections {
    pub fn any(&self) -> bool {
        self.roll || self.pitch || self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsTick {
    pub pose: CameraPose,
    pub corrections: Corrections,
    pub readout: HeadingReadout,
}

/// One frame of camera physics. Steps run in order and each sees the pose
/// left by the previous one: roll, pitch, height, readouts.
pub fn tick<T: TerrainSampler + ?Sized>(pose: CameraPose, terrain: &T) -> PhysicsTick {
    let mut pose = pose;
    let mut corrections = Corrections::default();

    if pose.roll.abs() > ROLL_TOLERANCE_RAD || !pose.roll.is_finite() {
        pose.roll = 0.0;
        corrections.roll = true;
    }

    let min_pitch = MIN_PITCH_DEG.to_radians();
    let max_pitch = MAX_PITCH_DEG.to_radians();
    if pose.pitch < min_pitch || !pose.pitch.is_finite() {
        pose.pitch = min_pitch;
        corrections.pitch = true;
    } else if pose.pitch > max_pitch {
        pose.pitch = max_pitch;
        corrections.pitch = true;
    }

    if let Some(ground) = terrain.height_at(pose.longitude, pose.latitude) {
        let eye = ground + EYE_OFFSET_M;
        if (pose.height - eye).abs() > HEIGHT_TOLERANCE_M {
            pose.height = eye;
            corrections.height = true;
        }
    }

    PhysicsTick {
        pose,
        corrections,
        readout: HeadingReadout::from_heading(pose.heading),
    }
}

/// Run [`tick`] against a rig, writing the pose back only when something was
/// corrected.
pub fn step<R, T>(rig: &mut R, terrain: &T) -> PhysicsTick
where
    R: CameraRig + ?Sized,
    T: TerrainSampler + ?Sized,
{
    let result = tick(rig.pose(), terrain);
    if result.corrections.any() {
        rig.set_pose(result.pose);
    }
    result
}

/// Move the observer to a new target location at eye level, keeping heading
/// and pitch and leveling roll.
///
/// Without terrain at the target the current height is kept.
pub fn place_at_target<T: TerrainSampler + ?Sized>(
    pose: CameraPose,
    target: GeoPoint,
    terrain: &T,
) -> CameraPose {
    let height = terrain
        .height_at(target.longitude, target.latitude)
        .map(|ground| ground + EYE_OFFSET_M)
        .unwrap_or(pose.height);

    CameraPose {
        longitude: target.longitude,
        latitude: target.latitude,
        height,
        heading: pose.heading,
        pitch: pose.pitch,
        roll: 0.0,
    }
}
