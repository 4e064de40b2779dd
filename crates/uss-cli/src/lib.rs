//! USS CLI - operator tools for the USS node.
//!
//! - generate_token: JWT generator for the server's scope middleware
//! - submit_flight_plan: flight planning injection client

pub mod auth;
pub mod flight_plan;

pub use auth::{generate_dummy_token, TokenConfig};
pub use flight_plan::{circular_flight_plan, CircularPlan};
