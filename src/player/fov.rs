use bevy::prelude::*;

/// FOV change per wheel event, radians
pub const FOV_STEP_RAD: f32 = 0.05;
pub const FOV_MIN_DEG: f32 = 5.0;
pub const FOV_MAX_DEG: f32 = 120.0;
pub const FOV_INITIAL_DEG: f32 = 60.0;

/// Vertical field of view of the observer camera.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    radians: f32,
}

impl Default for FieldOfView {
    fn default() -> Self {
        Self {
            radians: FOV_INITIAL_DEG.to_radians(),
        }
    }
}

impl FieldOfView {
    pub fn radians(&self) -> f32 {
        self.radians
    }

    /// Clamped value rounded to whole degrees, for display.
    pub fn degrees(&self) -> i32 {
        self.radians.to_degrees().round() as i32
    }

    /// Widen (positive delta) or narrow (negative delta) by one step. Only the
    /// sign of `delta` matters and zero changes nothing.
    pub fn apply_delta(&mut self, delta: f32) -> f32 {
        let step = if delta > 0.0 {
            FOV_STEP_RAD
        } else if delta < 0.0 {
            -FOV_STEP_RAD
        } else {
            0.0
        };
        self.radians = (self.radians + step).clamp(FOV_MIN_DEG.to_radians(), FOV_MAX_DEG.to_radians());
        self.radians
    }
}
