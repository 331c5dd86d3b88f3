//! Shared geodesic math and the local observer frame.
//!
//! The observer view is rendered in a local tangent plane anchored at the
//! session origin: X points east, Y points up and -Z points north, which is
//! Bevy's Y-up convention with the default camera looking north.

use bevy::prelude::*;

/// Mean Earth radius in kilometers (the value the OpenSky bounding box uses)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

/// Conversion factor: meters to feet
pub const METERS_TO_FEET: f64 = 3.280_84;

/// Conversion factor: meters per second to knots
pub const MPS_TO_KNOTS: f64 = 1.943_844;

/// A geodetic position in degrees/meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both components are finite and inside ±90 / ±180.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Latitude/longitude search window, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl BoundingBox {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.lamin + self.lamax) / 2.0,
            (self.lomin + self.lomax) / 2.0,
        )
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.lamin..=self.lamax).contains(&point.latitude)
            && (self.lomin..=self.lomax).contains(&point.longitude)
    }
}

/// Equirectangular box of `radius_km` around an observer, clamped to the
/// valid coordinate range.
///
/// The approximation is fine for radii much smaller than the Earth's radius.
/// Near the poles `cos(lat)` goes to zero and the longitude offset blows up,
/// in which case the box spans every longitude.
pub fn bounding_box(latitude: f64, longitude: f64, radius_km: f64) -> BoundingBox {
    let lat_offset = (radius_km / EARTH_RADIUS_KM).to_degrees();
    let lon_offset = (radius_km / (EARTH_RADIUS_KM * latitude.to_radians().cos())).to_degrees();
    let lon_offset = if lon_offset.is_finite() && lon_offset >= 0.0 {
        lon_offset
    } else {
        360.0
    };

    BoundingBox {
        lamin: (latitude - lat_offset).max(-90.0),
        lomin: (longitude - lon_offset).max(-180.0),
        lamax: (latitude + lat_offset).min(90.0),
        lomax: (longitude + lon_offset).min(180.0),
    }
}

/// Calculate the great-circle distance between two lat/lon points
/// using the Haversine formula. Returns distance in kilometers.
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

// =============================================================================
// Local Frame
// =============================================================================

/// Flat local tangent frame around a fixed origin.
///
/// Converts geodetic coordinates to Bevy world-space positions. Distances are
/// equirectangular, which keeps error well under a meter per kilometer inside
/// the search radius the viewer uses.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub origin: GeoPoint,
    /// Height (meters above the ellipsoid) that maps to world Y = 0
    pub origin_height: f64,
}

impl LocalFrame {
    pub fn new(origin: GeoPoint, origin_height: f64) -> Self {
        Self {
            origin,
            origin_height,
        }
    }

    /// Convert a geodetic position to a world-space translation.
    pub fn to_world(&self, longitude: f64, latitude: f64, height: f64) -> Vec3 {
        let east = (longitude - self.origin.longitude).to_radians()
            * EARTH_RADIUS_M
            * self.origin.latitude.to_radians().cos();
        let north = (latitude - self.origin.latitude).to_radians() * EARTH_RADIUS_M;
        let up = height - self.origin_height;
        Vec3::new(east as f32, up as f32, -north as f32)
    }
}

impl Default for LocalFrame {
    fn default() -> Self {
        Self::new(GeoPoint::default(), 0.0)
    }
}

/// Rotation about the local vertical for a compass heading (degrees,
/// clockwise from north). Zero maps to looking along -Z.
pub fn heading_rotation(heading_deg: f64) -> Quat {
    Quat::from_rotation_y(-(heading_deg.to_radians()) as f32)
}
