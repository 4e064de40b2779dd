pub mod authorisation;
pub mod deconfliction;
pub mod geometry;
pub mod index;
pub mod ledger;
pub mod models;
pub mod planning;
pub mod spatial;

pub use authorisation::{
    AuthorisationChain, AuthorisationError, AuthorisationValidator, OperatorRegistrationValidator,
    SerialNumberValidator,
};
pub use deconfliction::{
    evaluate, requires_check, ConflictingIntent, Deconfliction, ExistingIntent, PriorityRelation,
};
pub use geometry::{
    any_intersect, pre_creation_checks, to_bounding_box, to_geojson, validate_volumes,
    volumes_intersect, GeometryError, VolumeEnvelope, VolumeField,
};
pub use index::{IndexEntry, SpatialIndex};
pub use ledger::{NotificationFreshness, NotificationLedger};
pub use models::{
    Altitude, Circle, FlightDeclaration, LatLngPoint, OperationalIntent,
    OperationalIntentDetails, OperationalIntentReference, OperationalIntentState, Polygon,
    Radius, SubscriberToNotify, SubscriptionState, Time, Volume3D, Volume4D,
};
pub use planning::{
    CapabilitiesResponse, ClearAreaOutcome, ClearAreaRequest, ClearAreaResponse, DeletionOutcome,
    DeletionResponse, FlightPlan, FlightPlanStatus, NotPlannedReason, PlanningOutcome,
    PlanningResponse, UpsertFlightPlanRequest, UssCapability,
};
pub use spatial::{haversine_distance, BoundingBox};
