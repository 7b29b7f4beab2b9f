//! Sources of the city list that refresh passes walk over.

use async_trait::async_trait;
use common::errors::AppError;
use common::models::{Entity, EntityId};
use sqlx::PgPool;
use std::path::Path;
use tracing::info;

/// Read-only view of the cities known to the content system.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn list_entities(&self) -> Result<Vec<Entity>, AppError>;

    async fn find_entity(&self, id: EntityId) -> Result<Option<Entity>, AppError> {
        let entities = self.list_entities().await?;
        Ok(entities.into_iter().find(|entity| entity.id == id))
    }
}

/// Fixed list of cities, typically loaded from a JSON file at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entities: Vec<Entity>,
}

impl StaticDirectory {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    /// Load a JSON array of `{id, name, latitude?, longitude?}` objects.
    pub async fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::config(format!("cannot read cities file {}: {}", path.display(), e))
        })?;
        let entities: Vec<Entity> = serde_json::from_str(&raw).map_err(|e| {
            AppError::config(format!("invalid cities file {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), count = entities.len(), "Loaded cities file");
        Ok(Self::new(entities))
    }
}

#[async_trait]
impl EntityDirectory for StaticDirectory {
    async fn list_entities(&self) -> Result<Vec<Entity>, AppError> {
        Ok(self.entities.clone())
    }

    async fn find_entity(&self, id: EntityId) -> Result<Option<Entity>, AppError> {
        Ok(self.entities.iter().find(|entity| entity.id == id).cloned())
    }
}

#[derive(sqlx::FromRow)]
struct CityRow {
    id: i64,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<CityRow> for Entity {
    fn from(row: CityRow) -> Self {
        Entity {
            id: EntityId(row.id),
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

/// Cities read from the `cities` table.
#[derive(Clone)]
pub struct PgEntityDirectory {
    pool: PgPool,
}

impl PgEntityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityDirectory for PgEntityDirectory {
    async fn list_entities(&self) -> Result<Vec<Entity>, AppError> {
        let rows = sqlx::query_as::<_, CityRow>(
            r#"
            SELECT id, name, latitude, longitude
            FROM cities
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Entity::from).collect())
    }

    async fn find_entity(&self, id: EntityId) -> Result<Option<Entity>, AppError> {
        let row = sqlx::query_as::<_, CityRow>(
            r#"
            SELECT id, name, latitude, longitude
            FROM cities
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Entity::from))
    }
}
