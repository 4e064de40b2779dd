//! Builder for single-volume flight plans.

use chrono::{Duration, Utc};

use uss_core::models::{LatLngPoint, Volume4D};
use uss_core::planning::{
    AstmF3548Information, BasicFlightPlanInformation, FlightPlan, UasState,
    UpsertFlightPlanRequest, UsageState,
};

pub const ALTITUDE_LOWER_M: f64 = 100.0;
pub const ALTITUDE_UPPER_M: f64 = 150.0;

#[derive(Debug, Clone)]
pub struct CircularPlan {
    pub center: LatLngPoint,
    pub radius_m: f64,
    pub priority: i32,
    pub usage_state: UsageState,
    pub uas_state: UasState,
    pub duration_mins: i64,
}

/// One circle, 100-150 m, from now for `duration_mins`.
pub fn circular_flight_plan(plan: &CircularPlan) -> UpsertFlightPlanRequest {
    let start = Utc::now();
    let end = start + Duration::minutes(plan.duration_mins);
    let area = vec![Volume4D::circle(
        plan.center,
        plan.radius_m,
        (ALTITUDE_LOWER_M, ALTITUDE_UPPER_M),
        (start, end),
    )];

    UpsertFlightPlanRequest {
        request_id: None,
        flight_plan: FlightPlan {
            basic_information: BasicFlightPlanInformation {
                usage_state: plan.usage_state,
                uas_state: plan.uas_state,
                area,
            },
            astm_f3548_21: Some(AstmF3548Information {
                priority: Some(plan.priority),
            }),
            uspace_flight_authorisation: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_targets_requested_state() {
        let request = circular_flight_plan(&CircularPlan {
            center: LatLngPoint::new(46.97, 7.47),
            radius_m: 150.0,
            priority: 20,
            usage_state: UsageState::InUse,
            uas_state: UasState::Contingent,
            duration_mins: 15,
        });
        let plan = &request.flight_plan;
        assert_eq!(plan.priority(), 20);
        assert_eq!(
            plan.target_state(),
            Ok(uss_core::models::OperationalIntentState::Contingent)
        );
        let (start, end) = plan.basic_information.area[0].time_window().unwrap();
        assert_eq!(end - start, Duration::minutes(15));
    }
}
