use bevy::prelude::*;

use super::{
    draw_aircraft_tracks, reposition_on_frame_change, scale_aircraft_bodies, teardown_aircraft,
    AircraftEntities, AircraftMeshes, AircraftStore, CommandsScene,
};
use crate::config::AppConfig;
use crate::geo::LocalFrame;
use crate::session::SessionState;

pub struct AircraftPlugin;

impl Plugin for AircraftPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AircraftStore>()
            .init_resource::<AircraftEntities>()
            .init_resource::<AircraftMeshes>()
            .add_systems(
                Update,
                (
                    reposition_on_frame_change.before(scale_aircraft_bodies),
                    scale_aircraft_bodies,
                    draw_aircraft_tracks,
                )
                    .run_if(in_state(SessionState::Active)),
            )
            .add_systems(OnExit(SessionState::Active), despawn_all_aircraft);
    }
}

pub(crate) fn despawn_all_aircraft(
    mut commands: Commands,
    mut store: ResMut<AircraftStore>,
    mut entities: ResMut<AircraftEntities>,
    meshes: Res<AircraftMeshes>,
    frame: Res<LocalFrame>,
    config: Res<AppConfig>,
) {
    let mut scene = CommandsScene {
        commands: &mut commands,
        meshes: &meshes,
        frame: &frame,
        heading_offset_deg: config.feed.model_heading_offset_deg,
    };
    let removed = teardown_aircraft(&mut store, &mut entities.0, &mut scene);
    info!("Removed {} aircraft from display", removed);
}
