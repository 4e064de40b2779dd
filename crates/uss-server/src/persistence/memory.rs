//! In-memory flight declaration store used when no database path is set.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use uss_core::models::FlightDeclaration;

use super::FlightDeclarationRepository;

#[derive(Default)]
pub struct InMemoryFlightDeclarationRepository {
    declarations: DashMap<String, FlightDeclaration>,
}

impl InMemoryFlightDeclarationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlightDeclarationRepository for InMemoryFlightDeclarationRepository {
    async fn get_flight_declaration(&self, id: &str) -> Result<Option<FlightDeclaration>> {
        Ok(self.declarations.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_operational_intent_id(
        &self,
        operational_intent_id: Uuid,
    ) -> Result<Option<FlightDeclaration>> {
        Ok(self
            .declarations
            .iter()
            .find(|entry| entry.operational_intent_id() == Some(operational_intent_id))
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, declaration: &FlightDeclaration) -> Result<()> {
        self.declarations
            .insert(declaration.id.clone(), declaration.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.declarations.remove(id).is_some())
    }

    async fn list_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlightDeclaration>> {
        let mut hits: Vec<FlightDeclaration> = self
            .declarations
            .iter()
            .filter(|entry| entry.overlaps_window(start, end))
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by_key(|declaration| declaration.start_datetime);
        Ok(hits)
    }
}
