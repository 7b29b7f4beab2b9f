use city_weather_service::api_client::OpenMeteoClient;
use city_weather_service::directory::{EntityDirectory, StaticDirectory};
use city_weather_service::query::QueryFacade;
use city_weather_service::scheduler::RefreshScheduler;
use city_weather_service::store::{MemoryReadingStore, ReadingStore};
use common::http_client::HttpClient;
use common::models::{Entity, EntityId, PassOutcome};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

fn cities() -> Vec<Entity> {
    vec![
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
        Entity {
            id: EntityId(3),
            name: "Nowhere".into(),
            latitude: None,
            longitude: None,
        },
    ]
}

struct Pipeline {
    scheduler: RefreshScheduler,
    store: Arc<MemoryReadingStore>,
    query: QueryFacade,
}

fn pipeline(server: &MockServer) -> Pipeline {
    let directory: Arc<dyn EntityDirectory> = Arc::new(StaticDirectory::new(cities()));
    let store = Arc::new(MemoryReadingStore::new(directory.clone()));
    let source = OpenMeteoClient::new(
        HttpClient::new(2, 1).unwrap(),
        &format!("{}/v1/forecast", server.uri()),
        None,
        60_000,
    )
    .unwrap();

    let scheduler = RefreshScheduler::new(
        directory,
        Arc::new(source),
        store.clone(),
        4,
        Duration::from_secs(5),
        CancellationToken::new(),
    );
    let query = QueryFacade::new(store.clone());

    Pipeline {
        scheduler,
        store,
        query,
    }
}

/// London answers, Paris fails upstream, Nowhere has no coordinates.
async fn mount_upstream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "51.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current": {
                "temperature_2m": 15.0,
                "relative_humidity_2m": 70.0,
                "weather_code": 3
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "48.85"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn one_pass_stores_only_successful_cities() {
    let server = MockServer::start().await;
    mount_upstream(&server).await;
    let pipeline = pipeline(&server);

    let outcome = pipeline.scheduler.run_refresh_pass().await.unwrap();
    let PassOutcome::Completed(summary) = outcome else {
        panic!("pass should not be skipped");
    };

    assert_eq!(summary.total_entities, 3);
    assert_eq!(summary.skipped_missing_coordinates, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let rows = pipeline.store.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity.id, EntityId(1));
    assert_eq!(rows[0].reading.temperature_c, 15.0);
    assert_eq!(rows[0].reading.humidity, 70.0);
    assert!(rows[0].reading.captured_at >= summary.started_at);

    let err = pipeline.store.get(EntityId(2)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(pipeline.store.get(EntityId(3)).await.unwrap_err().is_not_found());

    // Only London and Paris went upstream; Paris was retried once
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn second_pass_overwrites_in_place() {
    let server = MockServer::start().await;
    mount_upstream(&server).await;
    let pipeline = pipeline(&server);

    pipeline.scheduler.run_refresh_pass().await.unwrap();
    let first = pipeline.store.get(EntityId(1)).await.unwrap();

    pipeline.scheduler.run_refresh_pass().await.unwrap();
    let second = pipeline.store.get(EntityId(1)).await.unwrap();

    assert_eq!(pipeline.store.len(), 1);
    assert!(second.captured_at >= first.captured_at);
}

#[tokio::test]
async fn query_facade_reads_without_fetching() {
    let server = MockServer::start().await;
    mount_upstream(&server).await;
    let pipeline = pipeline(&server);

    assert!(pipeline.query.all_readings().await.unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());

    pipeline.scheduler.run_refresh_pass().await.unwrap();
    let before = server.received_requests().await.unwrap().len();

    let london = pipeline.query.filter("lon").await.unwrap();
    assert_eq!(london.len(), 1);
    assert_eq!(london[0].entity.name, "London");
    assert!(pipeline.query.filter("paris").await.unwrap().is_empty());

    assert_eq!(server.received_requests().await.unwrap().len(), before);
}
