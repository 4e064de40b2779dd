//! Flight declaration persistence operations.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use uss_core::models::{FlightDeclaration, OperationalIntent, OperationalIntentState};

use super::FlightDeclarationRepository;

const SELECT_COLUMNS: &str = "SELECT id, aircraft_id, state, priority, bounds, start_datetime, end_datetime, raw_geojson, operational_intent, created_at, updated_at FROM flight_declarations";

/// Fixed-width UTC timestamps so text comparison orders like time.
fn to_db_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct SqliteFlightDeclarationRepository {
    pool: SqlitePool,
}

impl SqliteFlightDeclarationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlightDeclarationRepository for SqliteFlightDeclarationRepository {
    async fn get_flight_declaration(&self, id: &str) -> Result<Option<FlightDeclaration>> {
        let row = sqlx::query_as::<_, FlightDeclarationRow>(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }

    async fn find_by_operational_intent_id(
        &self,
        operational_intent_id: Uuid,
    ) -> Result<Option<FlightDeclaration>> {
        let row = sqlx::query_as::<_, FlightDeclarationRow>(&format!(
            "{} WHERE operational_intent_id = ?1",
            SELECT_COLUMNS
        ))
        .bind(operational_intent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }

    async fn save(&self, declaration: &FlightDeclaration) -> Result<()> {
        let geojson = serde_json::to_string(&declaration.raw_geojson)?;
        let intent_json = match &declaration.operational_intent {
            Some(intent) => Some(serde_json::to_string(intent)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO flight_declarations (
                id, aircraft_id, state, priority, bounds,
                start_datetime, end_datetime, raw_geojson,
                operational_intent, operational_intent_id,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                aircraft_id = ?2, state = ?3, priority = ?4, bounds = ?5,
                start_datetime = ?6, end_datetime = ?7, raw_geojson = ?8,
                operational_intent = ?9, operational_intent_id = ?10,
                updated_at = ?12
            "#,
        )
        .bind(&declaration.id)
        .bind(&declaration.aircraft_id)
        .bind(declaration.state.as_str())
        .bind(declaration.priority)
        .bind(&declaration.bounds)
        .bind(to_db_time(&declaration.start_datetime))
        .bind(to_db_time(&declaration.end_datetime))
        .bind(&geojson)
        .bind(&intent_json)
        .bind(declaration.operational_intent_id().map(|id| id.to_string()))
        .bind(to_db_time(&declaration.created_at))
        .bind(to_db_time(&declaration.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flight_declarations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlightDeclaration>> {
        let rows = sqlx::query_as::<_, FlightDeclarationRow>(&format!(
            "{} WHERE start_datetime < ?1 AND end_datetime > ?2 ORDER BY start_datetime",
            SELECT_COLUMNS
        ))
        .bind(to_db_time(&end))
        .bind(to_db_time(&start))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct FlightDeclarationRow {
    id: String,
    aircraft_id: String,
    state: String,
    priority: i32,
    bounds: String,
    start_datetime: String,
    end_datetime: String,
    raw_geojson: String,
    operational_intent: Option<String>,
    created_at: String,
    updated_at: String,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

impl TryFrom<FlightDeclarationRow> for FlightDeclaration {
    type Error = anyhow::Error;

    fn try_from(row: FlightDeclarationRow) -> Result<Self> {
        let state: OperationalIntentState = row.state.parse().map_err(anyhow::Error::msg)?;
        let operational_intent: Option<OperationalIntent> = match row.operational_intent {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(FlightDeclaration {
            id: row.id,
            aircraft_id: row.aircraft_id,
            state,
            priority: row.priority,
            bounds: row.bounds,
            start_datetime: parse_time(&row.start_datetime)?,
            end_datetime: parse_time(&row.end_datetime)?,
            raw_geojson: serde_json::from_str(&row.raw_geojson)?,
            operational_intent,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::persistence::init_database;
    use chrono::Duration;
    use uss_core::models::{
        LatLngPoint, OperationalIntentDetails, OperationalIntentReference, Volume4D,
    };

    pub(crate) fn declaration(id: &str, start: DateTime<Utc>, minutes: i64) -> FlightDeclaration {
        let end = start + Duration::minutes(minutes);
        let volume = Volume4D::circle(LatLngPoint::new(46.97, 7.47), 100.0, (0.0, 120.0), (start, end));
        let intent_id = Uuid::new_v4();
        FlightDeclaration {
            id: id.to_string(),
            aircraft_id: "0000".to_string(),
            state: OperationalIntentState::Accepted,
            priority: 0,
            bounds: "7.4687,46.9691,7.4713,46.9709".to_string(),
            start_datetime: start,
            end_datetime: end,
            raw_geojson: serde_json::json!({"type": "FeatureCollection", "features": []}),
            operational_intent: Some(OperationalIntent {
                reference: OperationalIntentReference {
                    id: intent_id,
                    manager: "uss".to_string(),
                    uss_availability: None,
                    version: 1,
                    state: OperationalIntentState::Accepted,
                    ovn: Some("ovn-1".to_string()),
                    time_start: Some(start.into()),
                    time_end: Some(end.into()),
                    uss_base_url: "http://self.local".to_string(),
                    subscription_id: None,
                },
                details: OperationalIntentDetails {
                    volumes: vec![volume],
                    off_nominal_volumes: Vec::new(),
                    priority: 0,
                },
            }),
            created_at: start,
            updated_at: start,
        }
    }

    async fn repository() -> SqliteFlightDeclarationRepository {
        let db = init_database(":memory:", 1).await.unwrap();
        SqliteFlightDeclarationRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn save_and_reload_preserves_state_label_and_intent() {
        let repo = repository().await;
        let mut record = declaration("fp-1", Utc::now(), 30);
        record.state = OperationalIntentState::Contingent;
        repo.save(&record).await.unwrap();

        let loaded = repo.get_flight_declaration("fp-1").await.unwrap().unwrap();
        assert_eq!(loaded.state, OperationalIntentState::Contingent);
        assert_eq!(loaded.ovn(), Some("ovn-1"));

        let by_intent = repo
            .find_by_operational_intent_id(record.operational_intent_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_intent.id, "fp-1");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let repo = repository().await;
        let mut record = declaration("fp-1", Utc::now(), 30);
        repo.save(&record).await.unwrap();
        record.state = OperationalIntentState::Activated;
        record.priority = 40;
        repo.save(&record).await.unwrap();

        let loaded = repo.get_flight_declaration("fp-1").await.unwrap().unwrap();
        assert_eq!(loaded.state, OperationalIntentState::Activated);
        assert_eq!(loaded.priority, 40);
    }

    #[tokio::test]
    async fn time_window_query_uses_open_overlap() {
        let repo = repository().await;
        let now = Utc::now();
        repo.save(&declaration("early", now, 10)).await.unwrap();
        repo.save(&declaration("late", now + Duration::minutes(20), 10))
            .await
            .unwrap();

        let hits = repo
            .list_by_time_window(now + Duration::minutes(10), now + Duration::minutes(20))
            .await
            .unwrap();
        assert!(hits.is_empty());

        let hits = repo
            .list_by_time_window(now + Duration::minutes(5), now + Duration::minutes(25))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let repo = repository().await;
        repo.save(&declaration("fp-1", Utc::now(), 30)).await.unwrap();
        assert!(repo.delete("fp-1").await.unwrap());
        assert!(!repo.delete("fp-1").await.unwrap());
        assert!(repo.get_flight_declaration("fp-1").await.unwrap().is_none());
    }
}
