use bevy::prelude::*;

use super::reconcile::SceneEntities;
use super::store::AircraftStore;
use crate::config::AppConfig;
use crate::flight_data::AircraftState;
use crate::geo::{heading_rotation, LocalFrame, METERS_TO_FEET};
use crate::player::PlayerCamera;

/// Nose-to-tail length of the procedural aircraft model, in meters
const MODEL_LENGTH_M: f32 = 38.0;

/// Smallest angular size an aircraft may shrink to before it is scaled up,
/// so distant traffic stays visible from the ground.
const MIN_ANGULAR_SIZE_RAD: f32 = 0.012;

/// Root entity of a rendered aircraft. Carries position and heading.
#[derive(Component, Debug, Clone)]
pub struct TrackedAircraft {
    pub id: String,
}

/// Child holding the meshes; scaled with viewing distance.
#[derive(Component)]
pub struct AircraftBody;

/// Text painted next to the aircraft by the HUD.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct AircraftLabel {
    pub text: String,
}

impl AircraftLabel {
    pub fn for_state(aircraft: &AircraftState) -> Self {
        let feet = aircraft.position.altitude * METERS_TO_FEET;
        Self {
            text: format!("{}\n{:.0} ft", aircraft.display_callsign(), feet),
        }
    }
}

/// Shared meshes and material for every aircraft.
///
/// The model's nose points along +X, which the configured heading offset
/// (-90° by default) turns to north.
#[derive(Resource, Clone)]
pub struct AircraftMeshes {
    pub fuselage: Handle<Mesh>,
    pub wings: Handle<Mesh>,
    pub tail: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
}

impl FromWorld for AircraftMeshes {
    fn from_world(world: &mut World) -> Self {
        let mut meshes = world.resource_mut::<Assets<Mesh>>();
        let fuselage = meshes.add(Capsule3d::new(2.0, MODEL_LENGTH_M - 4.0));
        let wings = meshes.add(Cuboid::new(6.0, 0.6, 34.0));
        let tail = meshes.add(Cuboid::new(4.0, 6.0, 0.6));

        let material = world
            .resource_mut::<Assets<StandardMaterial>>()
            .add(StandardMaterial {
                base_color: Color::srgb(0.92, 0.93, 0.95),
                perceptual_roughness: 0.4,
                ..default()
            });

        Self {
            fuselage,
            wings,
            tail,
            material,
        }
    }
}

/// World transform of an aircraft: position in the local frame and a pure
/// yaw of heading plus the model offset.
pub fn aircraft_transform(
    frame: &LocalFrame,
    aircraft: &AircraftState,
    heading_offset_deg: f64,
) -> Transform {
    let p = &aircraft.position;
    Transform::from_translation(frame.to_world(p.longitude, p.latitude, p.altitude))
        .with_rotation(heading_rotation(aircraft.heading + heading_offset_deg))
}

/// [`SceneEntities`] over Bevy commands.
pub struct CommandsScene<'a, 'w, 's> {
    pub commands: &'a mut Commands<'w, 's>,
    pub meshes: &'a AircraftMeshes,
    pub frame: &'a LocalFrame,
    pub heading_offset_deg: f64,
}

impl SceneEntities for CommandsScene<'_, '_, '_> {
    type Handle = Entity;

    fn spawn_aircraft(&mut self, aircraft: &AircraftState) -> Entity {
        let meshes = self.meshes.clone();
        self.commands
            .spawn((
                Name::new(format!("Aircraft: {}", aircraft.display_callsign())),
                TrackedAircraft {
                    id: aircraft.id.clone(),
                },
                AircraftLabel::for_state(aircraft),
                aircraft_transform(self.frame, aircraft, self.heading_offset_deg),
                Visibility::default(),
            ))
            .with_children(|parent| {
                parent
                    .spawn((AircraftBody, Transform::default(), Visibility::default()))
                    .with_children(|body| {
                        body.spawn((
                            Mesh3d(meshes.fuselage.clone()),
                            MeshMaterial3d(meshes.material.clone()),
                            Transform::from_rotation(Quat::from_rotation_z(
                                std::f32::consts::FRAC_PI_2,
                            )),
                        ));
                        body.spawn((
                            Mesh3d(meshes.wings.clone()),
                            MeshMaterial3d(meshes.material.clone()),
                            Transform::from_xyz(1.0, 0.0, 0.0),
                        ));
                        body.spawn((
                            Mesh3d(meshes.tail.clone()),
                            MeshMaterial3d(meshes.material.clone()),
                            Transform::from_xyz(-MODEL_LENGTH_M / 2.0 + 2.0, 3.5, 0.0),
                        ));
                    });
            })
            .id()
    }

    fn update_aircraft(&mut self, handle: Entity, aircraft: &AircraftState) {
        self.commands.entity(handle).insert((
            aircraft_transform(self.frame, aircraft, self.heading_offset_deg),
            AircraftLabel::for_state(aircraft),
        ));
    }

    fn despawn_aircraft(&mut self, handle: Entity) {
        self.commands.entity(handle).despawn();
    }
}

/// Re-place every aircraft after the world origin moved.
pub fn reposition_on_frame_change(
    frame: Res<LocalFrame>,
    store: Res<AircraftStore>,
    config: Res<AppConfig>,
    mut roots: Query<(&TrackedAircraft, &mut Transform)>,
) {
    if !frame.is_changed() {
        return;
    }
    for (tracked, mut transform) in &mut roots {
        if let Some(aircraft) = store.get(&tracked.id) {
            *transform = aircraft_transform(&frame, aircraft, config.feed.model_heading_offset_deg);
        }
    }
}

/// Scale aircraft bodies so they never shrink below a minimum angular size.
pub fn scale_aircraft_bodies(
    camera: Query<&GlobalTransform, With<PlayerCamera>>,
    roots: Query<&GlobalTransform, With<TrackedAircraft>>,
    mut bodies: Query<(&mut Transform, &ChildOf), With<AircraftBody>>,
) {
    let Ok(camera) = camera.single() else {
        return;
    };
    let eye = camera.translation();

    for (mut transform, child_of) in &mut bodies {
        let Ok(root) = roots.get(child_of.parent()) else {
            continue;
        };
        let distance = root.translation().distance(eye);
        let scale = (distance * MIN_ANGULAR_SIZE_RAD / MODEL_LENGTH_M).max(1.0);
        transform.scale = Vec3::splat(scale);
    }
}

/// Draw fetched tracks as polylines.
pub fn draw_aircraft_tracks(
    mut gizmos: Gizmos,
    store: Res<AircraftStore>,
    frame: Res<LocalFrame>,
) {
    for aircraft in store.get_all().filter(|a| a.track.len() > 1) {
        let points = aircraft.track.iter().map(|p| {
            frame.to_world(
                p.longitude,
                p.latitude,
                p.altitude.unwrap_or(aircraft.position.altitude),
            )
        });
        gizmos.linestrip(points, Color::srgb(1.0, 0.75, 0.2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::store::test_support::aircraft;
    use crate::geo::GeoPoint;

    #[test]
    fn label_shows_callsign_and_feet() {
        let mut state = aircraft("4b1805", 6.7, 46.8);
        state.callsign = None;
        state.position.altitude = 1000.0;
        assert_eq!(AircraftLabel::for_state(&state).text, "N/A\n3281 ft");
    }

    #[test]
    fn model_offset_turns_nose_to_heading() {
        let frame = LocalFrame::new(GeoPoint::new(46.778, 6.6412), 437.0);
        let mut state = aircraft("a", 6.6412, 46.778);

        state.heading = 0.0;
        let nose = aircraft_transform(&frame, &state, -90.0).rotation * Vec3::X;
        // Heading 0 with the -90° offset points the +X nose north (-Z)
        assert!((nose - Vec3::NEG_Z).length() < 1e-5);

        state.heading = 90.0;
        let nose = aircraft_transform(&frame, &state, -90.0).rotation * Vec3::X;
        assert!((nose - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn orientation_has_no_pitch_or_roll() {
        let frame = LocalFrame::default();
        let mut state = aircraft("a", 0.0, 0.0);
        state.heading = 237.0;
        let up = aircraft_transform(&frame, &state, -90.0).rotation * Vec3::Y;
        assert!((up - Vec3::Y).length() < 1e-5);
    }

    fn reconcile_in_world(
        world: &mut World,
        reconciler: &mut crate::aircraft::AircraftReconciler<Entity>,
        snapshot: &[AircraftState],
    ) -> crate::aircraft::ReconcileStats {
        use bevy::ecs::world::CommandQueue;

        let meshes = AircraftMeshes {
            fuselage: Handle::default(),
            wings: Handle::default(),
            tail: Handle::default(),
            material: Handle::default(),
        };
        let frame = LocalFrame::new(GeoPoint::new(46.778, 6.6412), 437.0);
        let mut queue = CommandQueue::default();
        let stats = {
            let mut commands = Commands::new(&mut queue, world);
            let mut scene = CommandsScene {
                commands: &mut commands,
                meshes: &meshes,
                frame: &frame,
                heading_offset_deg: -90.0,
            };
            reconciler.reconcile(&mut scene, snapshot)
        };
        queue.apply(world);
        stats
    }

    #[test]
    fn commands_scene_keeps_entities_across_updates() {
        let mut world = World::new();
        let mut reconciler = crate::aircraft::AircraftReconciler::default();

        reconcile_in_world(
            &mut world,
            &mut reconciler,
            &[aircraft("a", 6.70, 46.80), aircraft("b", 6.50, 46.70)],
        );
        assert_eq!(world.query::<&TrackedAircraft>().iter(&world).count(), 2);
        let entity = reconciler.get("a").unwrap();
        let before = world.get::<Transform>(entity).unwrap().translation;

        let stats = reconcile_in_world(&mut world, &mut reconciler, &[aircraft("a", 6.75, 46.85)]);
        assert_eq!(stats.created, 0);
        assert_eq!(reconciler.get("a"), Some(entity));
        let after = world.get::<Transform>(entity).unwrap().translation;
        assert_ne!(before, after);
        assert_eq!(world.query::<&TrackedAircraft>().iter(&world).count(), 1);

        reconcile_in_world(&mut world, &mut reconciler, &[]);
        assert!(world.get_entity(entity).is_err());
        // Children go with their aircraft
        assert_eq!(world.query::<&AircraftBody>().iter(&world).count(), 0);
        assert_eq!(world.query::<&Mesh3d>().iter(&world).count(), 0);
    }
}
