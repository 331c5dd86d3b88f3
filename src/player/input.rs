use bevy::input::gestures::{PinchGesture, RotationGesture};
use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;
use std::f64::consts::TAU;

use super::fov::FieldOfView;
use super::pose::{CameraPose, CameraRig, PlayerCamera};
use crate::geo::{LocalFrame, EARTH_RADIUS_M};

/// Look rotation per dragged pixel at the initial 60° field of view
const LOOK_RAD_PER_PIXEL: f64 = 0.0025;

/// Pitch change per unit of pinch magnification
const PINCH_PITCH_RAD: f64 = 0.8;

/// Height change per wheel line in free mode
const ZOOM_STEP_M: f64 = 50.0;

/// Pixel-based wheel deltas are scaled to lines by this factor
const PIXELS_PER_LINE: f32 = 40.0;

/// Horizontal speed of the free camera
const FREE_MOVE_SPEED_MPS: f64 = 250.0;

#[derive(Resource, Default)]
pub(crate) struct DragState {
    is_dragging: bool,
    last_position: Option<Vec2>,
}

/// Whether egui owns the pointer this frame, so clicks and scrolls over
/// HUD panels never reach the camera.
#[derive(Resource, Default)]
pub(crate) struct EguiWantsPointer(pub(crate) bool);

pub(crate) fn check_egui_wants_input(
    mut contexts: EguiContexts,
    mut drag_state: ResMut<DragState>,
    mut egui_wants: ResMut<EguiWantsPointer>,
) {
    egui_wants.0 = contexts
        .ctx_mut()
        .is_ok_and(|ctx| ctx.wants_pointer_input() || ctx.is_pointer_over_area());
    if egui_wants.0 {
        drag_state.is_dragging = false;
        drag_state.last_position = None;
    }
}

/// Rotate the view by a screen-space drag. Dragging grabs the sky: moving the
/// pointer right turns the view left and moving it down looks up.
pub fn look(pose: CameraPose, drag: Vec2, fov_rad: f32) -> CameraPose {
    let scale = LOOK_RAD_PER_PIXEL * (fov_rad as f64 / 60f64.to_radians());
    let mut pose = pose;
    pose.heading = (pose.heading - drag.x as f64 * scale).rem_euclid(TAU);
    pose.pitch += drag.y as f64 * scale;
    pose
}

/// Wheel handling. Look-only cameras change the field of view (scrolling up
/// narrows it), zoomable cameras change height.
pub fn apply_wheel<R: CameraRig + ?Sized>(rig: &mut R, fov: &mut FieldOfView, scroll_y: f32) {
    let mode = rig.controller_mode();
    if mode.look_only {
        fov.apply_delta(-scroll_y);
    } else if mode.zoom {
        let mut pose = rig.pose();
        pose.height = (pose.height - scroll_y as f64 * ZOOM_STEP_M).max(0.0);
        rig.set_pose(pose);
    }
}

/// Move along the ground. `forward` and `right` are meters relative to the
/// current heading.
pub fn free_move(pose: CameraPose, forward: f64, right: f64) -> CameraPose {
    let (sin, cos) = pose.heading.sin_cos();
    let north = forward * cos - right * sin;
    let east = forward * sin + right * cos;

    let mut pose = pose;
    pose.latitude = (pose.latitude + (north / EARTH_RADIUS_M).to_degrees()).clamp(-89.9, 89.9);
    let meters_per_radian = EARTH_RADIUS_M * pose.latitude.to_radians().cos();
    pose.longitude += (east / meters_per_radian).to_degrees();
    if pose.longitude > 180.0 {
        pose.longitude -= 360.0;
    } else if pose.longitude < -180.0 {
        pose.longitude += 360.0;
    }
    pose
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_camera_input(
    mouse_button: Res<ButtonInput<MouseButton>>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut cursor_moved: MessageReader<CursorMoved>,
    mut wheel: MessageReader<MouseWheel>,
    mut pinch: MessageReader<PinchGesture>,
    mut rotation: MessageReader<RotationGesture>,
    mut drag_state: ResMut<DragState>,
    mut fov: ResMut<FieldOfView>,
    egui_wants: Res<EguiWantsPointer>,
    time: Res<Time>,
    mut cameras: Query<&mut PlayerCamera>,
) {
    let Ok(mut camera) = cameras.single_mut() else {
        return;
    };
    let mode = camera.controller_mode();

    if mouse_button.just_pressed(MouseButton::Left) && !egui_wants.0 {
        drag_state.is_dragging = true;
        drag_state.last_position = None;
    }
    if mouse_button.just_released(MouseButton::Left) {
        drag_state.is_dragging = false;
        drag_state.last_position = None;
    }

    if drag_state.is_dragging {
        for event in cursor_moved.read() {
            if let Some(last) = drag_state.last_position {
                let pose = look(camera.pose(), event.position - last, fov.radians());
                camera.set_pose(pose);
            }
            drag_state.last_position = Some(event.position);
        }
    } else {
        cursor_moved.clear();
    }

    if egui_wants.0 {
        wheel.clear();
        pinch.clear();
        rotation.clear();
        return;
    }

    for event in wheel.read() {
        let lines = match event.unit {
            MouseScrollUnit::Line => event.y,
            MouseScrollUnit::Pixel => event.y / PIXELS_PER_LINE,
        };
        apply_wheel(&mut *camera, &mut fov, lines);
    }

    // Gestures only ever turn the head, whatever the controller allows
    for PinchGesture(amount) in pinch.read() {
        let mut pose = camera.pose();
        pose.pitch += *amount as f64 * PINCH_PITCH_RAD;
        camera.set_pose(pose);
    }
    for RotationGesture(angle) in rotation.read() {
        let mut pose = camera.pose();
        pose.heading = (pose.heading - *angle as f64).rem_euclid(TAU);
        camera.set_pose(pose);
    }

    if mode.translate {
        let step = FREE_MOVE_SPEED_MPS * time.delta_secs_f64();
        let axis = |positive: KeyCode, negative: KeyCode| {
            keyboard.pressed(positive) as i32 as f64 - keyboard.pressed(negative) as i32 as f64
        };
        let forward = axis(KeyCode::KeyW, KeyCode::KeyS) * step;
        let right = axis(KeyCode::KeyD, KeyCode::KeyA) * step;
        if forward != 0.0 || right != 0.0 {
            let pose = free_move(camera.pose(), forward, right);
            camera.set_pose(pose);
        }
    }
}

/// Derive the camera transform and projection from its pose every frame.
pub(crate) fn sync_camera_transform(
    frame: Res<LocalFrame>,
    fov: Res<FieldOfView>,
    mut cameras: Query<(&PlayerCamera, &mut Transform, &mut Projection)>,
) {
    for (camera, mut transform, mut projection) in &mut cameras {
        *transform = camera.pose().to_transform(&frame);
        if let Projection::Perspective(perspective) = projection.as_mut() {
            perspective.fov = fov.radians();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_distance_km;
    use crate::player::pose::ControllerCapabilities;

    fn observer() -> PlayerCamera {
        PlayerCamera::new(
            CameraPose::new(6.6412, 46.778, 437.0),
            ControllerCapabilities::OBSERVER,
        )
    }

    #[test]
    fn wheel_changes_fov_in_look_only_mode() {
        let mut camera = observer();
        let mut fov = FieldOfView::default();
        let start = fov.radians();

        apply_wheel(&mut camera, &mut fov, 1.0);
        assert!(fov.radians() < start);
        assert_eq!(camera.pose().height, 437.0);

        apply_wheel(&mut camera, &mut fov, -3.0);
        assert!((fov.radians() - start).abs() < 1e-6);
    }

    #[test]
    fn wheel_changes_height_in_free_mode() {
        let mut camera = observer();
        camera.set_controller_mode(ControllerCapabilities::FREE);
        let mut fov = FieldOfView::default();

        apply_wheel(&mut camera, &mut fov, -2.0);
        assert_eq!(camera.pose().height, 537.0);
        assert_eq!(fov, FieldOfView::default());
    }

    #[test]
    fn drag_rotates_without_moving() {
        let pose = CameraPose::new(6.6412, 46.778, 437.0);
        let turned = look(pose, Vec2::new(100.0, -40.0), 60f32.to_radians());

        assert_eq!(turned.longitude, pose.longitude);
        assert_eq!(turned.latitude, pose.latitude);
        assert_eq!(turned.height, pose.height);
        // Dragging right turns left, wrapping below north
        assert!(turned.heading > std::f64::consts::PI);
        assert!(turned.pitch < 0.0);
    }

    #[test]
    fn narrower_fov_turns_slower() {
        let pose = CameraPose::new(0.0, 0.0, 0.0);
        let wide = look(pose, Vec2::new(0.0, 100.0), 60f32.to_radians());
        let narrow = look(pose, Vec2::new(0.0, 100.0), 10f32.to_radians());
        assert!(narrow.pitch < wide.pitch);
    }

    #[test]
    fn free_move_follows_heading() {
        let start = CameraPose::new(6.6412, 46.778, 437.0)
            .with_orientation(90f64.to_radians(), 0.0, 0.0);
        let moved = free_move(start, 1000.0, 0.0);

        // Facing east, forward changes longitude only
        assert!((moved.latitude - start.latitude).abs() < 1e-9);
        assert!(moved.longitude > start.longitude);
        let km = haversine_distance_km(start.latitude, start.longitude, moved.latitude, moved.longitude);
        assert!((km - 1.0).abs() < 0.01);
    }
}
