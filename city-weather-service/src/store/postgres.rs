use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::errors::AppError;
use common::models::{CityReading, Entity, EntityId, Observation, Reading};
use sqlx::PgPool;

use super::ReadingStore;

#[derive(sqlx::FromRow)]
struct ReadingRow {
    city_id: i64,
    temperature_c: f64,
    description: String,
    humidity: f64,
    captured_at: DateTime<Utc>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            entity_id: EntityId(row.city_id),
            temperature_c: row.temperature_c,
            description: row.description,
            humidity: row.humidity,
            captured_at: row.captured_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CityReadingRow {
    city_id: i64,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    temperature_c: f64,
    description: String,
    humidity: f64,
    captured_at: DateTime<Utc>,
}

impl From<CityReadingRow> for CityReading {
    fn from(row: CityReadingRow) -> Self {
        CityReading {
            entity: Entity {
                id: EntityId(row.city_id),
                name: row.name,
                latitude: row.latitude,
                longitude: row.longitude,
            },
            reading: Reading {
                entity_id: EntityId(row.city_id),
                temperature_c: row.temperature_c,
                description: row.description,
                humidity: row.humidity,
                captured_at: row.captured_at,
            },
        }
    }
}

/// Readings in the `city_readings` table, one row per city.
///
/// Row-level locking in `INSERT ... ON CONFLICT` serializes writers per city.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn upsert(
        &self,
        entity_id: EntityId,
        observation: Observation,
    ) -> Result<Reading, AppError> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            INSERT INTO city_readings (city_id, temperature_c, description, humidity, captured_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (city_id) DO UPDATE SET
                temperature_c = EXCLUDED.temperature_c,
                description = EXCLUDED.description,
                humidity = EXCLUDED.humidity,
                captured_at = GREATEST(EXCLUDED.captured_at, city_readings.captured_at)
            RETURNING city_id, temperature_c, description, humidity, captured_at
            "#,
        )
        .bind(entity_id.0)
        .bind(observation.temperature_c)
        .bind(&observation.description)
        .bind(observation.humidity)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(&self, entity_id: EntityId) -> Result<Reading, AppError> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT city_id, temperature_c, description, humidity, captured_at
            FROM city_readings
            WHERE city_id = $1
            "#,
        )
        .bind(entity_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reading::from)
            .ok_or_else(|| AppError::not_found(format!("No reading for city {}", entity_id)))
    }

    async fn get_joined(&self, entity_id: EntityId) -> Result<CityReading, AppError> {
        let row = sqlx::query_as::<_, CityReadingRow>(
            r#"
            SELECT r.city_id, c.name, c.latitude, c.longitude,
                   r.temperature_c, r.description, r.humidity, r.captured_at
            FROM city_readings r
            INNER JOIN cities c ON c.id = r.city_id
            WHERE r.city_id = $1
            "#,
        )
        .bind(entity_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CityReading::from)
            .ok_or_else(|| AppError::not_found(format!("No reading for city {}", entity_id)))
    }

    async fn list(&self) -> Result<Vec<CityReading>, AppError> {
        let rows = sqlx::query_as::<_, CityReadingRow>(
            r#"
            SELECT r.city_id, c.name, c.latitude, c.longitude,
                   r.temperature_c, r.description, r.humidity, r.captured_at
            FROM city_readings r
            INNER JOIN cities c ON c.id = r.city_id
            ORDER BY c.name, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CityReading::from).collect())
    }

    async fn search(&self, needle: &str) -> Result<Vec<CityReading>, AppError> {
        let pattern = format!("%{}%", escape_like(needle.trim()));

        let rows = sqlx::query_as::<_, CityReadingRow>(
            r#"
            SELECT r.city_id, c.name, c.latitude, c.longitude,
                   r.temperature_c, r.description, r.humidity, r.captured_at
            FROM city_readings r
            INNER JOIN cities c ON c.id = r.city_id
            WHERE c.name ILIKE $1 ESCAPE '\'
            ORDER BY c.name, c.id
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CityReading::from).collect())
    }
}

/// Escape LIKE metacharacters so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("lon"), "lon");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\x"), "c:\\\\x");
    }
}
