//! Core data models for strategic coordination.
//!
//! Wire types follow the ASTM F3548-21 field names so they can be exchanged
//! with the DSS and peer USSes without translation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ALTITUDE_REFERENCE_W84: &str = "W84";
pub const UNITS_METERS: &str = "M";
pub const TIME_FORMAT_RFC3339: &str = "RFC3339";

fn default_units() -> String {
    UNITS_METERS.to_string()
}

fn default_altitude_reference() -> String {
    ALTITUDE_REFERENCE_W84.to_string()
}

fn default_time_format() -> String {
    TIME_FORMAT_RFC3339.to_string()
}

/// WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

impl LatLngPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Radius {
    pub value: f64,
    #[serde(default = "default_units")]
    pub units: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    #[serde(default)]
    pub center: Option<LatLngPoint>,
    #[serde(default)]
    pub radius: Option<Radius>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    #[serde(default)]
    pub vertices: Vec<LatLngPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Altitude {
    pub value: f64,
    #[serde(default = "default_altitude_reference")]
    pub reference: String,
    #[serde(default = "default_units")]
    pub units: String,
}

impl Altitude {
    pub fn meters_w84(value: f64) -> Self {
        Self {
            value,
            reference: default_altitude_reference(),
            units: default_units(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Time {
    pub value: DateTime<Utc>,
    #[serde(default = "default_time_format")]
    pub format: String,
}

impl From<DateTime<Utc>> for Time {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            value,
            format: default_time_format(),
        }
    }
}

/// Spatial part of a volume: one outline plus an altitude band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume3D {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_circle: Option<Circle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_polygon: Option<Polygon>,
    #[serde(default)]
    pub altitude_lower: Option<Altitude>,
    #[serde(default)]
    pub altitude_upper: Option<Altitude>,
}

/// Space, altitude and time window claimed by a flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume4D {
    pub volume: Volume3D,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
}

impl Volume4D {
    /// Circular volume with W84 altitudes in meters.
    pub fn circle(
        center: LatLngPoint,
        radius_m: f64,
        altitude_m: (f64, f64),
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Self {
        Self {
            volume: Volume3D {
                outline_circle: Some(Circle {
                    center: Some(center),
                    radius: Some(Radius {
                        value: radius_m,
                        units: default_units(),
                    }),
                }),
                outline_polygon: None,
                altitude_lower: Some(Altitude::meters_w84(altitude_m.0)),
                altitude_upper: Some(Altitude::meters_w84(altitude_m.1)),
            },
            time_start: Some(window.0.into()),
            time_end: Some(window.1.into()),
        }
    }

    /// Polygonal volume with W84 altitudes in meters.
    pub fn polygon(
        vertices: Vec<LatLngPoint>,
        altitude_m: (f64, f64),
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Self {
        Self {
            volume: Volume3D {
                outline_circle: None,
                outline_polygon: Some(Polygon { vertices }),
                altitude_lower: Some(Altitude::meters_w84(altitude_m.0)),
                altitude_upper: Some(Altitude::meters_w84(altitude_m.1)),
            },
            time_start: Some(window.0.into()),
            time_end: Some(window.1.into()),
        }
    }

    pub fn time_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.time_start.as_ref()?.value, self.time_end.as_ref()?.value))
    }

    pub fn altitude_range(&self) -> Option<(f64, f64)> {
        Some((
            self.volume.altitude_lower.as_ref()?.value,
            self.volume.altitude_upper.as_ref()?.value,
        ))
    }
}

/// Lifecycle state of an operational intent.
///
/// `Nonconforming` and `Contingent` share legacy code 3 in older stores; they
/// are kept distinct here and persisted by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalIntentState {
    Accepted,
    Activated,
    Nonconforming,
    Contingent,
    Ended,
}

impl OperationalIntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Activated => "Activated",
            Self::Nonconforming => "Nonconforming",
            Self::Contingent => "Contingent",
            Self::Ended => "Ended",
        }
    }

    /// Integer code used by legacy flight declaration stores.
    pub fn legacy_code(&self) -> u8 {
        match self {
            Self::Accepted => 1,
            Self::Activated => 2,
            Self::Nonconforming | Self::Contingent => 3,
            Self::Ended => 4,
        }
    }

    pub fn is_off_nominal(&self) -> bool {
        matches!(self, Self::Nonconforming | Self::Contingent)
    }
}

impl fmt::Display for OperationalIntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationalIntentState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Accepted" => Ok(Self::Accepted),
            "Activated" => Ok(Self::Activated),
            "Nonconforming" => Ok(Self::Nonconforming),
            "Contingent" => Ok(Self::Contingent),
            "Ended" => Ok(Self::Ended),
            other => Err(format!("unknown operational intent state '{}'", other)),
        }
    }
}

/// Operational intent reference as held by the DSS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntentReference {
    pub id: Uuid,
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub uss_availability: Option<String>,
    #[serde(default)]
    pub version: i64,
    pub state: OperationalIntentState,
    /// Opaque version token; only disclosed to the managing USS.
    #[serde(default)]
    pub ovn: Option<String>,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
    pub uss_base_url: String,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
}

/// Position of a single subscription in its notification sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_id: Uuid,
    #[serde(default)]
    pub notification_index: u64,
}

/// Peer USS that must be told about a change, as returned by DSS writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberToNotify {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionState>,
    pub uss_base_url: String,
}

/// Details served by the managing USS (not stored in the DSS).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntentDetails {
    #[serde(default)]
    pub volumes: Vec<Volume4D>,
    #[serde(default)]
    pub off_nominal_volumes: Vec<Volume4D>,
    #[serde(default)]
    pub priority: i32,
}

impl OperationalIntentDetails {
    /// Every volume that currently claims airspace.
    pub fn all_volumes(&self) -> Vec<Volume4D> {
        self.volumes
            .iter()
            .chain(self.off_nominal_volumes.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntent {
    pub reference: OperationalIntentReference,
    pub details: OperationalIntentDetails,
}

/// Local mirror of a flight submitted through this USS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightDeclaration {
    /// Caller-supplied flight plan id.
    pub id: String,
    pub aircraft_id: String,
    pub state: OperationalIntentState,
    pub priority: i32,
    /// "minLon,minLat,maxLon,maxLat" of the submitted volumes.
    pub bounds: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub raw_geojson: serde_json::Value,
    #[serde(default)]
    pub operational_intent: Option<OperationalIntent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlightDeclaration {
    pub fn operational_intent_id(&self) -> Option<Uuid> {
        self.operational_intent.as_ref().map(|intent| intent.reference.id)
    }

    pub fn ovn(&self) -> Option<&str> {
        self.operational_intent
            .as_ref()
            .and_then(|intent| intent.reference.ovn.as_deref())
    }

    pub fn overlaps_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_datetime < end && start < self.end_datetime
    }
}
