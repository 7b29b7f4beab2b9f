//! Persistence of the latest reading per city.
//!
//! A [`ReadingStore`] holds at most one [`Reading`] per [`EntityId`]. Writes go
//! through [`ReadingStore::upsert`], which stamps `captured_at` itself and never
//! moves it backwards for a given city. Two backends exist: [`MemoryReadingStore`]
//! for single-process deployments and tests, and [`PgReadingStore`] on top of
//! the `city_readings` table.

pub mod memory;
pub mod migrations;
pub mod postgres;

use async_trait::async_trait;
use common::errors::AppError;
use common::models::{CityReading, EntityId, Observation, Reading};
use sqlx::PgPool;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert or overwrite the reading for `entity_id`, returning what was stored.
    async fn upsert(&self, entity_id: EntityId, observation: Observation)
    -> Result<Reading, AppError>;

    /// Point lookup; `AppError::NotFound` when the city has no reading yet.
    async fn get(&self, entity_id: EntityId) -> Result<Reading, AppError>;

    /// Point lookup joined with the city; `AppError::NotFound` when there is
    /// no reading or the city is no longer in the directory.
    async fn get_joined(&self, entity_id: EntityId) -> Result<CityReading, AppError>;

    /// Every stored reading joined with its city, ordered by city name.
    async fn list(&self) -> Result<Vec<CityReading>, AppError>;

    /// Readings whose city name contains `needle`, ignoring case.
    /// A blank needle matches everything.
    async fn search(&self, needle: &str) -> Result<Vec<CityReading>, AppError>;
}

pub async fn create_pool(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPool::connect(database_url).await?;

    migrations::run_migrations(&pool).await?;

    Ok(pool)
}

pub(crate) fn name_matches(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    needle.is_empty() || name.to_lowercase().contains(&needle.to_lowercase())
}

pub(crate) fn sort_for_display(rows: &mut [CityReading]) {
    rows.sort_by(|a, b| {
        a.entity
            .name
            .cmp(&b.entity.name)
            .then(a.entity.id.cmp(&b.entity.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_matching_ignores_case_and_padding() {
        assert!(name_matches("London", "lon"));
        assert!(name_matches("London", "LON"));
        assert!(name_matches("Londonderry", " don "));
        assert!(!name_matches("Paris", "lon"));
        assert!(name_matches("Paris", ""));
        assert!(name_matches("Paris", "   "));
    }
}
