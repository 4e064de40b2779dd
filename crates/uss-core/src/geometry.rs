//! Validation and normalisation of 4D volumes.
//!
//! Everything here is pure: volumes go in, an envelope, a bounding box or a
//! GeoJSON document comes out. Rules are checked in a fixed order and the
//! first violation is reported with the index of the offending volume.

use std::f64::consts::PI;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{Altitude, LatLngPoint, Time, Volume4D, ALTITUDE_REFERENCE_W84, UNITS_METERS};
use crate::spatial::{
    meters_to_lat, meters_to_lon, offset_by_bearing, project_local, ring_area,
    ring_self_intersects, rings_intersect, BoundingBox,
};

/// Vertices used to approximate a circular outline.
pub const CIRCLE_SEGMENTS: usize = 32;

/// Furthest a new volume may start in the future.
pub const MAX_PLANNING_HORIZON_DAYS: i64 = 30;

/// Part of a volume that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeField {
    Outline,
    Circle,
    Polygon,
    AltitudeLower,
    AltitudeUpper,
    TimeStart,
    TimeEnd,
}

impl VolumeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outline => "outline",
            Self::Circle => "outline_circle",
            Self::Polygon => "outline_polygon",
            Self::AltitudeLower => "altitude_lower",
            Self::AltitudeUpper => "altitude_upper",
            Self::TimeStart => "time_start",
            Self::TimeEnd => "time_end",
        }
    }
}

impl fmt::Display for VolumeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("submission contains no volumes")]
    Empty,
    #[error("volume {index}: {field}: {reason}")]
    Invalid {
        index: usize,
        field: VolumeField,
        reason: String,
    },
}

impl GeometryError {
    fn invalid(index: usize, field: VolumeField, reason: impl Into<String>) -> Self {
        Self::Invalid {
            index,
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> Option<VolumeField> {
        match self {
            Self::Empty => None,
            Self::Invalid { field, .. } => Some(*field),
        }
    }
}

/// Union of all volumes of one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEnvelope {
    pub bbox: BoundingBox,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub altitude_lower: f64,
    pub altitude_upper: f64,
}

impl VolumeEnvelope {
    pub fn bounds_string(&self) -> String {
        self.bbox.to_string()
    }
}

/// Validate every volume and return their combined envelope.
pub fn validate_volumes(volumes: &[Volume4D]) -> Result<VolumeEnvelope, GeometryError> {
    if volumes.is_empty() {
        return Err(GeometryError::Empty);
    }

    let mut envelope: Option<VolumeEnvelope> = None;
    for (index, volume) in volumes.iter().enumerate() {
        let bbox = validate_outline(index, volume)?;
        let (lower, upper) = validate_altitudes(index, volume)?;
        let (start, end) = validate_times(index, volume)?;

        envelope = Some(match envelope {
            None => VolumeEnvelope {
                bbox,
                time_start: start,
                time_end: end,
                altitude_lower: lower,
                altitude_upper: upper,
            },
            Some(current) => VolumeEnvelope {
                bbox: current.bbox.union(&bbox),
                time_start: current.time_start.min(start),
                time_end: current.time_end.max(end),
                altitude_lower: current.altitude_lower.min(lower),
                altitude_upper: current.altitude_upper.max(upper),
            },
        });
    }

    envelope.ok_or(GeometryError::Empty)
}

/// Time checks applied only when a new intent is created.
pub fn pre_creation_checks(volumes: &[Volume4D], now: DateTime<Utc>) -> Result<(), GeometryError> {
    let horizon = now + Duration::days(MAX_PLANNING_HORIZON_DAYS);
    for (index, volume) in volumes.iter().enumerate() {
        let Some((start, end)) = volume.time_window() else {
            return Err(GeometryError::invalid(
                index,
                VolumeField::TimeStart,
                "time bounds are required",
            ));
        };
        if end <= now {
            return Err(GeometryError::invalid(
                index,
                VolumeField::TimeEnd,
                "volume ends in the past",
            ));
        }
        if start > horizon {
            return Err(GeometryError::invalid(
                index,
                VolumeField::TimeStart,
                format!(
                    "volume starts more than {} days in the future",
                    MAX_PLANNING_HORIZON_DAYS
                ),
            ));
        }
    }
    Ok(())
}

fn in_range(point: &LatLngPoint) -> bool {
    point.lat.is_finite()
        && point.lng.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lng)
}

/// Drop consecutive repeats and a closing vertex equal to the first.
fn distinct_vertices(vertices: &[LatLngPoint]) -> Vec<LatLngPoint> {
    let mut out: Vec<LatLngPoint> = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        if out.last() != Some(vertex) {
            out.push(*vertex);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn validate_outline(index: usize, volume: &Volume4D) -> Result<BoundingBox, GeometryError> {
    let circle = volume.volume.outline_circle.as_ref();
    let polygon = volume.volume.outline_polygon.as_ref();

    match (circle, polygon) {
        (None, None) => Err(GeometryError::invalid(
            index,
            VolumeField::Outline,
            "an outline circle or polygon is required",
        )),
        (Some(_), Some(_)) => Err(GeometryError::invalid(
            index,
            VolumeField::Outline,
            "only one of outline_circle and outline_polygon may be set",
        )),
        (Some(circle), None) => {
            let center = circle.center.as_ref().ok_or_else(|| {
                GeometryError::invalid(index, VolumeField::Circle, "center is required")
            })?;
            if !in_range(center) {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Circle,
                    "center is outside valid latitude/longitude ranges",
                ));
            }
            let radius = circle.radius.as_ref().ok_or_else(|| {
                GeometryError::invalid(index, VolumeField::Circle, "radius is required")
            })?;
            if !radius.value.is_finite() || radius.value <= 0.0 {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Circle,
                    "radius must be a positive number",
                ));
            }
            if radius.units != UNITS_METERS {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Circle,
                    format!("radius units must be {}", UNITS_METERS),
                ));
            }
            Ok(circle_bbox(*center, radius.value))
        }
        (None, Some(polygon)) => {
            let vertices = distinct_vertices(&polygon.vertices);
            if vertices.len() < 3 {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Polygon,
                    "at least 3 distinct vertices are required",
                ));
            }
            if !vertices.iter().all(in_range) {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Polygon,
                    "vertex is outside valid latitude/longitude ranges",
                ));
            }
            let projected = project_local(&vertices, vertices[0]);
            if ring_self_intersects(&projected) {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Polygon,
                    "polygon edges intersect",
                ));
            }
            if ring_area(&projected) <= f64::EPSILON {
                return Err(GeometryError::invalid(
                    index,
                    VolumeField::Polygon,
                    "polygon has no area",
                ));
            }
            BoundingBox::from_points(&vertices).ok_or_else(|| {
                GeometryError::invalid(index, VolumeField::Polygon, "polygon has no vertices")
            })
        }
    }
}

fn validate_altitudes(index: usize, volume: &Volume4D) -> Result<(f64, f64), GeometryError> {
    let mut bounds = [0.0_f64; 2];
    for (slot, field, altitude) in [
        (0, VolumeField::AltitudeLower, &volume.volume.altitude_lower),
        (1, VolumeField::AltitudeUpper, &volume.volume.altitude_upper),
    ] {
        let altitude = altitude
            .as_ref()
            .ok_or_else(|| GeometryError::invalid(index, field, "altitude bound is required"))?;
        if !altitude.value.is_finite() {
            return Err(GeometryError::invalid(index, field, "altitude must be finite"));
        }
        if altitude.units != UNITS_METERS {
            return Err(GeometryError::invalid(
                index,
                field,
                format!("altitude units must be {}", UNITS_METERS),
            ));
        }
        if altitude.reference != ALTITUDE_REFERENCE_W84 {
            return Err(GeometryError::invalid(
                index,
                field,
                format!("altitude reference must be {}", ALTITUDE_REFERENCE_W84),
            ));
        }
        bounds[slot] = altitude.value;
    }

    let [lower, upper] = bounds;
    if lower > upper {
        return Err(GeometryError::invalid(
            index,
            VolumeField::AltitudeUpper,
            "altitude_upper is below altitude_lower",
        ));
    }
    Ok((lower, upper))
}

fn validate_times(
    index: usize,
    volume: &Volume4D,
) -> Result<(DateTime<Utc>, DateTime<Utc>), GeometryError> {
    let start = volume.time_start.as_ref().ok_or_else(|| {
        GeometryError::invalid(index, VolumeField::TimeStart, "time_start is required")
    })?;
    let end = volume.time_end.as_ref().ok_or_else(|| {
        GeometryError::invalid(index, VolumeField::TimeEnd, "time_end is required")
    })?;
    if start.value >= end.value {
        return Err(GeometryError::invalid(
            index,
            VolumeField::TimeEnd,
            "time_end must be after time_start",
        ));
    }
    Ok((start.value, end.value))
}

fn circle_bbox(center: LatLngPoint, radius_m: f64) -> BoundingBox {
    let dlat = meters_to_lat(radius_m, center.lat);
    let dlon = meters_to_lon(radius_m, center.lat);
    BoundingBox::new(
        center.lng - dlon,
        center.lat - dlat,
        center.lng + dlon,
        center.lat + dlat,
    )
}

/// Bounding box of a single volume's outline, if it has one.
pub fn volume_bounding_box(volume: &Volume4D) -> Option<BoundingBox> {
    if let Some(circle) = &volume.volume.outline_circle {
        let center = circle.center?;
        let radius = circle.radius.as_ref()?.value;
        return Some(circle_bbox(center, radius));
    }
    let polygon = volume.volume.outline_polygon.as_ref()?;
    BoundingBox::from_points(&polygon.vertices)
}

/// Union bounding box of all volumes; `None` when no volume has an outline.
pub fn to_bounding_box(volumes: &[Volume4D]) -> Option<BoundingBox> {
    volumes
        .iter()
        .filter_map(volume_bounding_box)
        .reduce(|acc, bbox| acc.union(&bbox))
}

/// Regular polygon approximating a circle. With `circumscribe` the polygon
/// encloses the circle instead of being inscribed in it.
pub fn circle_ring(center: LatLngPoint, radius_m: f64, circumscribe: bool) -> Vec<LatLngPoint> {
    let step = 2.0 * PI / CIRCLE_SEGMENTS as f64;
    let distance = if circumscribe {
        radius_m / (step / 2.0).cos()
    } else {
        radius_m
    };
    (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let (lat, lng) = offset_by_bearing(center.lat, center.lng, distance, step * i as f64);
            LatLngPoint::new(lat, lng)
        })
        .collect()
}

/// Outline of a volume as an open ring of vertices.
pub fn outline_ring(volume: &Volume4D, circumscribe: bool) -> Option<Vec<LatLngPoint>> {
    if let Some(circle) = &volume.volume.outline_circle {
        let center = circle.center?;
        let radius = circle.radius.as_ref()?.value;
        return Some(circle_ring(center, radius, circumscribe));
    }
    let polygon = volume.volume.outline_polygon.as_ref()?;
    let vertices = distinct_vertices(&polygon.vertices);
    (vertices.len() >= 3).then_some(vertices)
}

/// GeoJSON FeatureCollection with one Polygon feature per volume.
pub fn to_geojson(volumes: &[Volume4D]) -> Value {
    let features: Vec<Value> = volumes
        .iter()
        .filter_map(|volume| {
            let ring = outline_ring(volume, false)?;
            let mut coordinates: Vec<[f64; 2]> = ring.iter().map(|p| [p.lng, p.lat]).collect();
            coordinates.push(coordinates[0]);

            let altitude = |alt: &Option<Altitude>| {
                alt.as_ref()
                    .map(|a| json!({"meters": a.value, "datum": a.reference.to_lowercase()}))
                    .unwrap_or(Value::Null)
            };
            let time = |t: &Option<Time>| {
                t.as_ref()
                    .map(|t| Value::String(t.value.to_rfc3339()))
                    .unwrap_or(Value::Null)
            };

            Some(json!({
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [coordinates]},
                "properties": {
                    "min_altitude": altitude(&volume.volume.altitude_lower),
                    "max_altitude": altitude(&volume.volume.altitude_upper),
                    "start_time": time(&volume.time_start),
                    "end_time": time(&volume.time_end),
                }
            }))
        })
        .collect();

    json!({"type": "FeatureCollection", "features": features})
}

/// Exact envelope test between two volumes.
///
/// Missing time or altitude bounds are treated as unbounded; a volume without
/// an outline claims no airspace.
pub fn volumes_intersect(a: &Volume4D, b: &Volume4D) -> bool {
    if let (Some((a_start, a_end)), Some((b_start, b_end))) = (a.time_window(), b.time_window()) {
        if !(a_start < b_end && b_start < a_end) {
            return false;
        }
    }
    if let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (a.altitude_range(), b.altitude_range()) {
        if !(a_lo <= b_hi && b_lo <= a_hi) {
            return false;
        }
    }

    let (Some(a_box), Some(b_box)) = (volume_bounding_box(a), volume_bounding_box(b)) else {
        return false;
    };
    if !a_box.intersects(&b_box) {
        return false;
    }

    let (Some(a_ring), Some(b_ring)) = (outline_ring(a, true), outline_ring(b, true)) else {
        return false;
    };
    let origin = a_ring[0];
    rings_intersect(
        &project_local(&a_ring, origin),
        &project_local(&b_ring, origin),
    )
}

/// True when any volume of `a` intersects any volume of `b`.
pub fn any_intersect(a: &[Volume4D], b: &[Volume4D]) -> bool {
    a.iter().any(|va| b.iter().any(|vb| volumes_intersect(va, vb)))
}
