use async_trait::async_trait;
use common::errors::{AppError, FetchError};
use common::http_client::HttpClient;
use common::models::{Coordinates, Observation};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Anything that can turn coordinates into a current observation.
///
/// Implementations hold no per-city state and must be safe to call from many
/// refresh tasks at once.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, coordinates: Coordinates) -> Result<Observation, FetchError>;
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: u32,
}

pub struct OpenMeteoClient {
    http_client: HttpClient,
    base_url: Url,
    api_key: Option<String>,
    last_request_time: Mutex<Option<Instant>>,
    min_request_interval: Duration,
}

impl OpenMeteoClient {
    pub fn new(
        http_client: HttpClient,
        base_url: &str,
        api_key: Option<String>,
        rate_limit_per_minute: u32,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::config(format!("invalid weather API URL {}: {}", base_url, e)))?;
        let min_request_interval =
            Duration::from_millis(60_000 / rate_limit_per_minute.max(1) as u64);

        Ok(Self {
            http_client,
            base_url,
            api_key,
            last_request_time: Mutex::new(None),
            min_request_interval,
        })
    }

    fn forecast_url(&self, coordinates: Coordinates) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("latitude", &coordinates.latitude.to_string())
                .append_pair("longitude", &coordinates.longitude.to_string())
                .append_pair(
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code",
                );
            if let Some(key) = &self.api_key {
                query.append_pair("apikey", key);
            }
        }
        url
    }

    /// Keep at least `min_request_interval` between outbound requests.
    async fn throttle(&self) {
        let mut last_request = self.last_request_time.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_request_interval {
                let wait_time = self.min_request_interval - elapsed;
                debug!(wait_ms = wait_time.as_millis() as u64, "Throttling request");
                tokio::time::sleep(wait_time).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    #[instrument(skip(self), fields(lat = coordinates.latitude, lon = coordinates.longitude))]
    async fn fetch(&self, coordinates: Coordinates) -> Result<Observation, FetchError> {
        if !coordinates.is_valid() {
            return Err(FetchError::InvalidCoordinates {
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            });
        }

        self.throttle().await;

        info!("Fetching weather from API");
        let response: OpenMeteoResponse =
            self.http_client.get_json(&self.forecast_url(coordinates)).await?;

        let current = response.current;
        if !current.temperature_2m.is_finite() || !current.relative_humidity_2m.is_finite() {
            return Err(FetchError::upstream(None, "non-numeric weather values"));
        }

        Ok(Observation {
            temperature_c: current.temperature_2m,
            description: describe_weather_code(current.weather_code).to_string(),
            humidity: current.relative_humidity_2m.clamp(0.0, 100.0),
        })
    }
}

/// Text for a WMO weather interpretation code.
pub fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Foggy",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snow",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}
