use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use chrono::{DateTime, Local, Utc};

use crate::aircraft::{AircraftLabel, AircraftStore};
use crate::config::AppConfig;
use crate::flight_data::{FlightFeed, MoonTexture, TrackRequested};
use crate::geo::{haversine_distance_km, GeoPoint, METERS_TO_FEET, MPS_TO_KNOTS};
use crate::player::{CameraReadout, FieldOfView, HeadingReadout, PlayerCamera, TargetLocation};
use crate::session::SessionState;
use crate::sky::{Moon, MoonState};

/// Rows in the nearby aircraft list.
const NEARBY_LIMIT: usize = 8;

const LABEL_FONT_SIZE: f32 = 12.0;
const MOON_LABEL_FONT_SIZE: f32 = 16.0;

/// One row of the nearby aircraft list.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyAircraft {
    pub id: String,
    pub callsign: String,
    pub altitude_ft: f64,
    pub speed_kt: f64,
    pub distance_km: f64,
    pub has_track: bool,
}

/// Everything the HUD panel shows, gathered once per frame.
#[derive(Debug, Clone, Default)]
pub struct HudState {
    pub heading: Option<HeadingReadout>,
    pub fov_degrees: i32,
    pub aircraft_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub loading: bool,
    pub error: Option<String>,
    pub observer_name: String,
    pub target: GeoPoint,
    /// Target comes from a location fix rather than the configured default
    pub located: bool,
    pub session_active: bool,
    pub moon: MoonTexture,
    pub moon_sky: Option<MoonState>,
    pub nearby: Vec<NearbyAircraft>,
    /// Ids whose Track button was clicked this frame
    pub track_requests: Vec<String>,
}

/// Closest aircraft to `center`, nearest first.
pub fn nearby_aircraft(store: &AircraftStore, center: GeoPoint, limit: usize) -> Vec<NearbyAircraft> {
    let mut rows: Vec<NearbyAircraft> = store
        .get_all()
        .map(|a| NearbyAircraft {
            id: a.id.clone(),
            callsign: a.display_callsign().to_string(),
            altitude_ft: a.position.altitude * METERS_TO_FEET,
            speed_kt: a.velocity * MPS_TO_KNOTS,
            distance_km: haversine_distance_km(
                center.latitude,
                center.longitude,
                a.position.latitude,
                a.position.longitude,
            ),
            has_track: !a.track.is_empty(),
        })
        .collect();
    rows.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    rows.truncate(limit);
    rows
}

fn moon_status(moon: &MoonTexture) -> String {
    match moon {
        MoonTexture::NotRequested => "Moon: -".to_string(),
        MoonTexture::Pending => "Moon: loading".to_string(),
        MoonTexture::Unavailable => "Moon: no credentials".to_string(),
        MoonTexture::Ready(_) => "Moon: texture ready".to_string(),
        MoonTexture::Failed(e) => format!("Moon: failed ({})", e),
    }
}

/// Draw the HUD contents into `ui`. Track button clicks are collected into
/// `state.track_requests`.
pub fn render_hud_panel(ui: &mut egui::Ui, state: &mut HudState) {
    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::from_rgb(255, 110, 90), format!("Error: {}", error));
        ui.separator();
    }

    match state.heading {
        Some(readout) => ui.label(format!("Heading: {}° {}", readout.angle, readout.label)),
        None => ui.label("Heading: -"),
    };
    ui.label(format!("FOV: {}°", state.fov_degrees));
    ui.label(format!("Aircraft: {}", state.aircraft_count));

    let updated = state
        .last_updated
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    ui.label(format!("Last update: {}", updated));
    if state.loading {
        ui.label("Loading...");
    }

    ui.separator();
    let source = if state.located { "located" } else { "default" };
    ui.label(format!("Observer: {}", state.observer_name));
    ui.label(format!(
        "Position: {:.4}, {:.4} ({})",
        state.target.latitude, state.target.longitude, source
    ));
    ui.label(moon_status(&state.moon));
    if let Some(sky) = state.moon_sky {
        if sky.elevation > 0.0 {
            ui.label(format!(
                "Moon at {:.0}° elevation, bearing {:.0}°",
                sky.elevation, sky.azimuth
            ));
        } else {
            ui.label("Moon below the horizon");
        }
    }
    if !state.session_active {
        ui.label("Suspended, press P to resume");
    }

    if state.nearby.is_empty() {
        return;
    }
    ui.separator();
    egui::Grid::new("nearby_aircraft")
        .num_columns(5)
        .striped(true)
        .show(ui, |ui| {
            for row in &state.nearby {
                ui.label(row.callsign.as_str());
                ui.label(format!("{:.0} ft", row.altitude_ft));
                ui.label(format!("{:.0} kt", row.speed_kt));
                ui.label(format!("{:.1} km", row.distance_km));
                if row.has_track {
                    ui.label("Tracked");
                } else if ui.button("Track").clicked() {
                    state.track_requests.push(row.id.clone());
                }
                ui.end_row();
            }
        });
}

#[allow(clippy::too_many_arguments)]
fn render_hud(
    mut contexts: EguiContexts,
    readout: Res<CameraReadout>,
    fov: Res<FieldOfView>,
    store: Res<AircraftStore>,
    feed: Option<Res<FlightFeed>>,
    config: Res<AppConfig>,
    target: Res<TargetLocation>,
    session: Res<State<SessionState>>,
    moon_sky: Option<Res<MoonState>>,
    mut tracks: MessageWriter<TrackRequested>,
) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    let center = target.or_observer(&config);
    let mut state = HudState {
        heading: readout.heading,
        fov_degrees: fov.degrees(),
        aircraft_count: store.count(),
        last_updated: feed.as_ref().and_then(|f| f.status.last_updated),
        loading: feed.as_ref().is_some_and(|f| f.is_loading()),
        error: feed.as_ref().and_then(|f| f.status.last_error.clone()),
        observer_name: config.observer.name.clone(),
        target: center,
        located: target.0.is_some(),
        session_active: *session.get() == SessionState::Active,
        moon: feed.as_ref().map(|f| f.status.moon.clone()).unwrap_or_default(),
        moon_sky: moon_sky.map(|m| *m),
        nearby: nearby_aircraft(&store, center, NEARBY_LIMIT),
        track_requests: Vec::new(),
    };

    egui::Window::new("Skywalk")
        .anchor(egui::Align2::LEFT_TOP, [10.0, 10.0])
        .resizable(false)
        .collapsible(true)
        .show(ctx, |ui| render_hud_panel(ui, &mut state));

    for id in state.track_requests {
        tracks.write(TrackRequested(id));
    }
}

/// Paint each aircraft's label, and the moon's, next to its projected
/// screen position.
fn draw_scene_labels(
    mut contexts: EguiContexts,
    camera: Query<(&Camera, &GlobalTransform), With<PlayerCamera>>,
    labels: Query<(&AircraftLabel, &GlobalTransform)>,
    moon: Query<(&GlobalTransform, &Visibility), With<Moon>>,
) {
    let Ok((camera, camera_transform)) = camera.single() else {
        return;
    };
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Background,
        "scene_labels".into(),
    ));
    for (label, transform) in &labels {
        let Ok(screen) = camera.world_to_viewport(camera_transform, transform.translation()) else {
            continue;
        };
        painter.text(
            egui::pos2(screen.x + 8.0, screen.y - 8.0),
            egui::Align2::LEFT_BOTTOM,
            &label.text,
            egui::FontId::proportional(LABEL_FONT_SIZE),
            egui::Color32::WHITE,
        );
    }

    for (transform, visibility) in &moon {
        if *visibility == Visibility::Hidden {
            continue;
        }
        let Ok(screen) = camera.world_to_viewport(camera_transform, transform.translation()) else {
            continue;
        };
        painter.text(
            egui::pos2(screen.x, screen.y - 20.0),
            egui::Align2::CENTER_BOTTOM,
            "Moon",
            egui::FontId::monospace(MOON_LABEL_FONT_SIZE),
            egui::Color32::YELLOW,
        );
    }
}

pub struct HudPlugin;

impl Plugin for HudPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(EguiPrimaryContextPass, (draw_scene_labels, render_hud));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::store::test_support::aircraft;
    use egui_kittest::{kittest::Queryable, Harness};

    fn row(id: &str, callsign: &str, has_track: bool) -> NearbyAircraft {
        NearbyAircraft {
            id: id.to_string(),
            callsign: callsign.to_string(),
            altitude_ft: 35000.0,
            speed_kt: 450.0,
            distance_km: 12.34,
            has_track,
        }
    }

    fn harness(state: HudState) -> Harness<'static, HudState> {
        Harness::new_ui_state(|ui, state: &mut HudState| render_hud_panel(ui, state), state)
    }

    #[test]
    fn shows_heading_and_fov() {
        let harness = harness(HudState {
            heading: Some(HeadingReadout::from_heading(std::f64::consts::PI)),
            fov_degrees: 60,
            aircraft_count: 3,
            session_active: true,
            ..default()
        });

        harness.get_by_label("Heading: 180° S");
        harness.get_by_label("FOV: 60°");
        harness.get_by_label("Aircraft: 3");
        harness.get_by_label("Last update: never");
    }

    #[test]
    fn shows_error_banner() {
        let harness = harness(HudState {
            error: Some("HTTP 503 from https://opensky-network.org/api/states/all".to_string()),
            ..default()
        });
        harness.get_by_label("Error: HTTP 503 from https://opensky-network.org/api/states/all");
        harness.get_by_label("Suspended, press P to resume");
    }

    #[test]
    fn track_button_requests_track() {
        let mut harness = harness(HudState {
            session_active: true,
            nearby: vec![row("4b1805", "SWR123", false)],
            ..default()
        });

        harness.get_by_label("SWR123");
        harness.get_by_label("35000 ft");
        harness.get_by_label("Track").click();
        harness.run();

        assert_eq!(harness.state().track_requests, vec!["4b1805".to_string()]);
    }

    #[test]
    fn tracked_aircraft_have_no_button() {
        let harness = harness(HudState {
            nearby: vec![row("4b1805", "N/A", true)],
            ..default()
        });
        harness.get_by_label("Tracked");
        assert!(harness.query_by_label("Track").is_none());
    }

    fn moon_at(elevation: f64, azimuth: f64) -> HudState {
        HudState {
            moon_sky: Some(MoonState {
                elevation,
                azimuth,
            }),
            ..default()
        }
    }

    #[test]
    fn moon_position_is_shown_when_up() {
        let up = harness(moon_at(23.4, 141.6));
        up.get_by_label("Moon at 23° elevation, bearing 142°");

        let below = harness(moon_at(-12.0, 300.0));
        below.get_by_label("Moon below the horizon");
    }

    #[test]
    fn moon_status_reads_out_each_state() {
        assert_eq!(moon_status(&MoonTexture::Unavailable), "Moon: no credentials");
        assert_eq!(
            moon_status(&MoonTexture::Ready("https://example.test/moon.png".into())),
            "Moon: texture ready"
        );
    }

    #[test]
    fn nearby_sorted_by_distance_and_limited() {
        let mut store = AircraftStore::default();
        let mut far = aircraft("far", 7.5, 47.5);
        far.callsign = Some("FAR1".to_string());
        store.upsert_many(vec![
            far,
            aircraft("near", 6.65, 46.78),
            aircraft("mid", 6.9, 46.9),
        ]);

        let rows = nearby_aircraft(&store, GeoPoint::new(46.778, 6.6412), 2);
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["near", "mid"]);
        assert!(rows[0].distance_km < 1.0);
        assert!((rows[0].altitude_ft - 3000.0 * METERS_TO_FEET).abs() < 1e-6);
    }
}
