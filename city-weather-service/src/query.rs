use common::errors::AppError;
use common::models::{CityReading, EntityId};
use std::sync::Arc;

use crate::store::ReadingStore;

/// Read side for presentation layers. Never triggers a fetch; missing data
/// comes back as an empty list or `None`.
#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<dyn ReadingStore>,
}

impl QueryFacade {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    pub async fn all_readings(&self) -> Result<Vec<CityReading>, AppError> {
        self.store.list().await
    }

    pub async fn filter(&self, needle: &str) -> Result<Vec<CityReading>, AppError> {
        self.store.search(needle).await
    }

    /// One city's reading, joined with its directory entry.
    pub async fn reading(&self, entity_id: EntityId) -> Result<Option<CityReading>, AppError> {
        match self.store.get_joined(entity_id).await {
            Ok(row) => Ok(Some(row)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{EntityDirectory, StaticDirectory};
    use crate::store::MemoryReadingStore;
    use common::models::{Entity, Observation};

    fn facade_with_store() -> (QueryFacade, Arc<MemoryReadingStore>) {
        let directory: Arc<dyn EntityDirectory> = Arc::new(StaticDirectory::new(vec![
            Entity {
                id: EntityId(1),
                name: "London".into(),
                latitude: Some(51.5),
                longitude: Some(-0.1),
            },
            Entity {
                id: EntityId(2),
                name: "Paris".into(),
                latitude: Some(48.85),
                longitude: Some(2.35),
            },
        ]));
        let store = Arc::new(MemoryReadingStore::new(directory));
        (QueryFacade::new(store.clone()), store)
    }

    #[tokio::test]
    async fn empty_store_yields_empty_results() {
        let (facade, _) = facade_with_store();

        assert!(facade.all_readings().await.unwrap().is_empty());
        assert!(facade.filter("lon").await.unwrap().is_empty());
        assert_eq!(facade.reading(EntityId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn filter_and_point_lookup() {
        let (facade, store) = facade_with_store();
        for id in [1, 2] {
            store
                .upsert(
                    EntityId(id),
                    Observation {
                        temperature_c: 12.0,
                        description: "Rain".into(),
                        humidity: 88.0,
                    },
                )
                .await
                .unwrap();
        }

        let matches = facade.filter("lon").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity.name, "London");

        let paris = facade.reading(EntityId(2)).await.unwrap().unwrap();
        assert_eq!(paris.entity.name, "Paris");
        assert_eq!(paris.reading.description, "Rain");

        assert_eq!(facade.all_readings().await.unwrap().len(), 2);
    }
}
