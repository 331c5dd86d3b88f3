use bevy::prelude::*;

use crate::geo::LocalFrame;

/// Observer camera pose. Angles are radians, heading clockwise from north,
/// pitch positive looking up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub longitude: f64,
    pub latitude: f64,
    /// Meters above the ellipsoid
    pub height: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl CameraPose {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }

    pub fn with_orientation(mut self, heading: f64, pitch: f64, roll: f64) -> Self {
        self.heading = heading;
        self.pitch = pitch;
        self.roll = roll;
        self
    }

    /// Bevy transform in the local frame. The camera looks along -Z, so
    /// heading yaws about +Y, pitch tilts about the camera's X axis and roll
    /// banks about its Z axis.
    pub fn to_transform(&self, frame: &LocalFrame) -> Transform {
        Transform::from_translation(frame.to_world(self.longitude, self.latitude, self.height))
            .with_rotation(Quat::from_euler(
                EulerRot::YXZ,
                -self.heading as f32,
                self.pitch as f32,
                -self.roll as f32,
            ))
    }
}

/// What the camera controller lets user input do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerCapabilities {
    pub zoom: bool,
    pub translate: bool,
    pub tilt: bool,
    /// Drag and pinch only rotate the view
    pub look_only: bool,
}

impl ControllerCapabilities {
    /// Unrestricted controller.
    pub const FREE: Self = Self {
        zoom: true,
        translate: true,
        tilt: true,
        look_only: false,
    };

    /// Fixed-position observer who can only turn their head.
    pub const OBSERVER: Self = Self {
        zoom: false,
        translate: false,
        tilt: false,
        look_only: true,
    };
}

impl Default for ControllerCapabilities {
    fn default() -> Self {
        Self::FREE
    }
}

/// Narrow handle on the camera the physics and input code drive.
pub trait CameraRig {
    fn pose(&self) -> CameraPose;
    fn set_pose(&mut self, pose: CameraPose);
    fn controller_mode(&self) -> ControllerCapabilities;
    fn set_controller_mode(&mut self, mode: ControllerCapabilities);
}

/// The observer camera. Its pose is the source of truth; the `Transform` is
/// derived from it every frame.
#[derive(Component, Debug, Clone)]
pub struct PlayerCamera {
    pose: CameraPose,
    mode: ControllerCapabilities,
}

impl PlayerCamera {
    pub fn new(pose: CameraPose, mode: ControllerCapabilities) -> Self {
        Self { pose, mode }
    }
}

impl CameraRig for PlayerCamera {
    fn pose(&self) -> CameraPose {
        self.pose
    }

    fn set_pose(&mut self, pose: CameraPose) {
        self.pose = pose;
    }

    fn controller_mode(&self) -> ControllerCapabilities {
        self.mode
    }

    fn set_controller_mode(&mut self, mode: ControllerCapabilities) {
        self.mode = mode;
    }
}
