use async_trait::async_trait;
use chrono::Utc;
use common::errors::AppError;
use common::models::{CityReading, EntityId, Observation, Reading};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use super::{ReadingStore, name_matches, sort_for_display};
use crate::directory::EntityDirectory;

/// In-process store keyed by city.
///
/// `DashMap` shards its locks, so the entry API gives an atomic
/// read-modify-write per city while other cities and readers proceed.
/// Names for `list`/`search` come from the directory at read time; readings
/// for cities the directory no longer publishes stay reachable through `get`.
pub struct MemoryReadingStore {
    readings: DashMap<EntityId, Reading>,
    directory: Arc<dyn EntityDirectory>,
}

impl MemoryReadingStore {
    pub fn new(directory: Arc<dyn EntityDirectory>) -> Self {
        Self {
            readings: DashMap::new(),
            directory,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    async fn joined(&self, needle: Option<&str>) -> Result<Vec<CityReading>, AppError> {
        let entities = self.directory.list_entities().await?;

        let mut rows: Vec<CityReading> = entities
            .into_iter()
            .filter(|entity| needle.is_none_or(|n| name_matches(&entity.name, n)))
            .filter_map(|entity| {
                let reading = self.readings.get(&entity.id)?.value().clone();
                Some(CityReading { entity, reading })
            })
            .collect();

        sort_for_display(&mut rows);
        Ok(rows)
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn upsert(
        &self,
        entity_id: EntityId,
        observation: Observation,
    ) -> Result<Reading, AppError> {
        let now = Utc::now();

        let stored = match self.readings.entry(entity_id) {
            Entry::Occupied(mut slot) => {
                let captured_at = now.max(slot.get().captured_at);
                let reading = Reading::from_observation(entity_id, observation, captured_at);
                slot.insert(reading.clone());
                reading
            }
            Entry::Vacant(slot) => {
                let reading = Reading::from_observation(entity_id, observation, now);
                slot.insert(reading.clone());
                reading
            }
        };

        Ok(stored)
    }

    async fn get(&self, entity_id: EntityId) -> Result<Reading, AppError> {
        self.readings
            .get(&entity_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AppError::not_found(format!("No reading for city {}", entity_id)))
    }

    async fn get_joined(&self, entity_id: EntityId) -> Result<CityReading, AppError> {
        let reading = self.get(entity_id).await?;
        let entity = self
            .directory
            .find_entity(entity_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("City {} is not in the directory", entity_id))
            })?;

        Ok(CityReading { entity, reading })
    }

    async fn list(&self) -> Result<Vec<CityReading>, AppError> {
        self.joined(None).await
    }

    async fn search(&self, needle: &str) -> Result<Vec<CityReading>, AppError> {
        self.joined(Some(needle)).await
    }
}
