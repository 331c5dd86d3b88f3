//! Session lifecycle.
//!
//! Everything the observer view owns (camera rig, location watch, refresh
//! schedule, aircraft entities) is set up on entering [`SessionState::Active`]
//! and torn down on leaving it. Plugins register their own `OnEnter` and
//! `OnExit` systems.

use bevy::ecs::message::Messages;
use bevy::prelude::*;
use bevy_egui::EguiContexts;

#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Active,
    Suspended,
}

pub struct SessionPlugin;

impl Plugin for SessionPlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<SessionState>()
            .add_systems(Update, toggle_session)
            .add_systems(Last, teardown_on_app_exit);
    }
}

/// P suspends or resumes the session.
fn toggle_session(
    keyboard: Res<ButtonInput<KeyCode>>,
    state: Res<State<SessionState>>,
    mut next: ResMut<NextState<SessionState>>,
    mut contexts: EguiContexts,
) {
    if let Ok(ctx) = contexts.ctx_mut() {
        if ctx.wants_keyboard_input() {
            return;
        }
    }
    if !keyboard.just_pressed(KeyCode::KeyP) {
        return;
    }

    let target = match state.get() {
        SessionState::Active => SessionState::Suspended,
        SessionState::Suspended => SessionState::Active,
    };
    info!("Session {:?} -> {:?}", state.get(), target);
    next.set(target);
}

/// Run the session teardown when the app is about to exit. State transitions
/// do not happen after `AppExit`, so the `OnExit` schedule is run directly.
fn teardown_on_app_exit(world: &mut World) {
    let exiting = world
        .get_resource::<Messages<AppExit>>()
        .is_some_and(|messages| !messages.is_empty());
    if !exiting {
        return;
    }

    let active = world
        .get_resource::<State<SessionState>>()
        .is_some_and(|state| *state.get() == SessionState::Active);
    if !active {
        return;
    }

    info!("Application exiting, tearing down session");
    if let Err(e) = world.try_run_schedule(OnExit(SessionState::Active)) {
        warn!("Session teardown schedule missing: {}", e);
    }
    world.insert_resource(State::new(SessionState::Suspended));
}
