//! Persistence layer for the USS server.
//!
//! The lifecycle orchestrator only sees [`FlightDeclarationRepository`]; the
//! SQLite and in-memory stores are interchangeable behind it.

pub mod db;
pub mod flight_declarations;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use uss_core::models::FlightDeclaration;

pub use db::{init_database, Database};
pub use flight_declarations::SqliteFlightDeclarationRepository;
pub use memory::InMemoryFlightDeclarationRepository;

#[async_trait]
pub trait FlightDeclarationRepository: Send + Sync {
    async fn get_flight_declaration(&self, id: &str) -> Result<Option<FlightDeclaration>>;

    async fn find_by_operational_intent_id(
        &self,
        operational_intent_id: Uuid,
    ) -> Result<Option<FlightDeclaration>>;

    /// Insert or replace by id.
    async fn save(&self, declaration: &FlightDeclaration) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Declarations whose window overlaps `[start, end)`.
    async fn list_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlightDeclaration>>;
}
