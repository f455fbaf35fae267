//! HTTP JSON API client
//!
//! Provides [`ApiClient`] for GET requests against a base address with
//! default credentials, a hard per-call timeout and a [`RetryPolicy`].

use super::{Auth, RetryPolicy};
use crate::error::{EtlError, EtlResult};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Client for JSON APIs.
///
/// # Example
/// ```no_run
/// use etl_orchestrator::client::{ApiClient, Auth, RetryPolicy};
/// use std::time::Duration;
/// use url::Url;
///
/// # async fn example() -> etl_orchestrator::error::EtlResult<()> {
/// let url = Url::parse("https://api.example.com/v1/").unwrap();
/// let client = ApiClient::try_new(url, Auth::None, Duration::from_secs(30), RetryPolicy::default())?;
///
/// let users = client.get_json("users", &[("page".into(), "1".into())]).await?;
/// println!("{}", users);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    url: Url,
    retry: RetryPolicy,
}

/// Shape of an endpoint's response, as reported by [`ApiClient::probe`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointProfile {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub size_bytes: usize,
    /// `list`, `dict`, `scalar` or `non_json`
    pub structure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<serde_json::Value>,
}

impl ApiClient {
    /// Create a new client for a base address.
    ///
    /// # Arguments
    /// * `url` - Base address endpoints are resolved against
    /// * `auth` - Credentials sent with every request
    /// * `timeout` - Hard limit for one call, including the body
    /// * `retry` - Policy for transient failures
    ///
    /// # Errors
    /// Returns a `Configuration` error if the credentials cannot form a
    /// header or the HTTP client cannot be built
    pub fn try_new(
        mut url: Url,
        auth: Auth,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> EtlResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(value) = auth.header_value() {
            let value = value
                .parse()
                .map_err(|_| EtlError::Configuration("invalid credentials header".to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| EtlError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        // Endpoints resolve below the base path, not beside it
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        log::debug!("API client for {} using {} auth", url, auth);

        Ok(Self { client, url, retry })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolve an endpoint path against the base address
    pub fn endpoint_url(&self, endpoint: &str) -> EtlResult<Url> {
        let stripped = endpoint.strip_prefix('/').unwrap_or(endpoint);
        self.url
            .join(stripped)
            .map_err(|e| EtlError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e)))
    }

    /// GET an endpoint and parse the JSON body, retrying transient failures
    ///
    /// # Errors
    /// - `TransientSource` when every attempt hit a timeout, connection
    ///   failure, 5xx or 429
    /// - `Source` for other non-success statuses or an unparseable body
    pub async fn get_json(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> EtlResult<serde_json::Value> {
        let url = self.endpoint_url(endpoint)?;
        let what = format!("GET {}", url);
        self.retry
            .run(&what, |attempt| {
                log::debug!("{} (attempt {})", what, attempt);
                self.get_once(&url, params)
            })
            .await
    }

    async fn get_once(&self, url: &Url, params: &[(String, String)]) -> EtlResult<serde_json::Value> {
        let response = self
            .client
            .get(url.clone())
            .query(params)
            .send()
            .await
            .map_err(|e| transient(url, e))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EtlError::TransientSource {
                attempts: 1,
                message: format!("{} returned {}", url, status),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Source(format!(
                "{} returned {}: {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response.bytes().await.map_err(|e| transient(url, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EtlError::Source(format!("{} returned invalid JSON: {}", url, e)))
    }

    /// Make one request and describe what the endpoint returns
    ///
    /// Non-success statuses are reported, not raised.
    pub async fn probe(&self, endpoint: &str) -> EtlResult<EndpointProfile> {
        let url = self.endpoint_url(endpoint)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transient(&url, e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| transient(&url, e))?;

        let mut profile = EndpointProfile {
            url: url.to_string(),
            status,
            content_type,
            size_bytes: bytes.len(),
            structure: "non_json".to_string(),
            record_count: None,
            keys: Vec::new(),
            sample: None,
        };
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(serde_json::Value::Array(items)) => {
                profile.structure = "list".to_string();
                profile.record_count = Some(items.len());
                profile.sample = items.into_iter().next();
            }
            Ok(serde_json::Value::Object(map)) => {
                profile.structure = "dict".to_string();
                profile.keys = map.keys().cloned().collect();
            }
            Ok(other) => {
                profile.structure = "scalar".to_string();
                profile.sample = Some(other);
            }
            Err(_) => {}
        }
        Ok(profile)
    }
}

impl std::fmt::Display for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

fn transient(url: &Url, error: reqwest::Error) -> EtlError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    EtlError::TransientSource {
        attempts: 1,
        message: format!("{} {}: {}", url, kind, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, auth: Auth, attempts: u32) -> ApiClient {
        ApiClient::try_new(
            Url::parse(&server.uri()).unwrap(),
            auth,
            Duration::from_secs(5),
            RetryPolicy::new(attempts, Duration::from_millis(1), 2.0),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_resolves_below_base_path() {
        let client = ApiClient::try_new(
            Url::parse("http://localhost:8080/api/v1").unwrap(),
            Auth::None,
            Duration::from_secs(1),
            RetryPolicy::none(),
        )
        .unwrap();
        assert_eq!(
            client.endpoint_url("/users").unwrap().as_str(),
            "http://localhost:8080/api/v1/users"
        );
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("page", "2"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Auth::Bearer("t0ken".into()), 1);
        let body = client
            .get_json("users", &[("page".into(), "2".into())])
            .await
            .unwrap();
        assert_eq!(body, serde_json::json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, Auth::None, 3);
        let err = client.get_json("flaky", &[]).await.unwrap_err();
        assert!(matches!(err, EtlError::TransientSource { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Auth::None, 3);
        let err = client.get_json("missing", &[]).await.unwrap_err();
        assert!(matches!(err, EtlError::Source(_)));
    }

    #[tokio::test]
    async fn test_invalid_json_is_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Auth::None, 2);
        let err = client.get_json("page", &[]).await.unwrap_err();
        assert!(matches!(err, EtlError::Source(_)));
    }

    #[tokio::test]
    async fn test_probe_describes_list_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"a": 1}, {"a": 2}])),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Auth::None, 1);
        let profile = client.probe("items").await.unwrap();
        assert_eq!(profile.status, 200);
        assert_eq!(profile.structure, "list");
        assert_eq!(profile.record_count, Some(2));
        assert_eq!(profile.sample, Some(serde_json::json!({"a": 1})));
    }
}
