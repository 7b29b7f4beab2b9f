use crate::errors::FetchError;
use reqwest::{Client, StatusCode, Url, header::RETRY_AFTER};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// HTTP client with retry logic and timeout
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("city-weather/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries,
            timeout,
        })
    }

    /// Fetch JSON from URL, retrying transient failures with exponential backoff
    #[instrument(skip(self), fields(url = %url.path()))]
    pub async fn get_json<T>(&self, url: &Url) -> Result<T, FetchError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0;

        loop {
            match self.fetch_with_timeout(url).await {
                Ok(response) => {
                    info!(attempt = attempt + 1, "Request successful");
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = Duration::from_millis(2_u64.pow(attempt) * 100);
                    warn!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying with exponential backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts = attempt + 1, error = %e, "Request failed");
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_with_timeout<T>(&self, url: &Url) -> Result<T, FetchError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = tokio::time::timeout(self.timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::network(format!("request to {} timed out", url.path())))??;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(FetchError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(FetchError::upstream(
                Some(status.as_u16()),
                format!("HTTP error: {}", status),
            ));
        }

        let text = response.text().await?;
        let json: T = serde_json::from_str(&text)?;

        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: i32,
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value": 7}"#))
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 2).unwrap();
        let payload: Payload = client.get_json(&url(&server, "/flaky")).await.unwrap();
        assert_eq!(payload.value, 7);
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/quota"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 3).unwrap();
        let err = client
            .get_json::<Payload>(&url(&server, "/quota"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FetchError::RateLimited {
                retry_after_secs: Some(120)
            }
        );
    }

    #[tokio::test]
    async fn client_errors_surface_as_upstream() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 2).unwrap();
        let err = client
            .get_json::<Payload>(&url(&server, "/missing"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Upstream {
                status: Some(404),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(2, 0).unwrap();
        let err = client
            .get_json::<Payload>(&url(&server, "/garbled"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn slow_upstream_times_out_as_network_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"value": 1}"#)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(1, 0).unwrap();
        let err = client
            .get_json::<Payload>(&url(&server, "/slow"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
    }
}
