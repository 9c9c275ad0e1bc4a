//! Shared blocking HTTP plumbing

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::debug;
use url::Url;

use super::{Result, SyncError};

/// Build a blocking client with the run's timeout and an optional bearer token
pub fn build_client(timeout_secs: u64, user_agent: &str, token: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent.to_string())
        .cookie_store(true);

    if let Some(token) = token {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SyncError::Transport(format!("invalid auth token: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| SyncError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// Default user agent for API calls
pub fn api_user_agent() -> String {
    format!("catalog-ingest/{}", env!("CARGO_PKG_VERSION"))
}

/// Join a path (with optional query) onto a base URL
pub fn join(base: &str, path: &str) -> Result<Url> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    let base = Url::parse(&base).map_err(|e| SyncError::Transport(format!("invalid base URL: {}", e)))?;
    base.join(path.trim_start_matches('/'))
        .map_err(|e| SyncError::Transport(format!("failed to construct URL: {}", e)))
}

/// Turn a non-2xx response into `SyncError::Http`
pub fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "Unknown error".to_string());
    debug!(status = %status, body = %body, "request failed");
    Err(SyncError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_keeps_base_path() {
        let url = join("https://studio.example.com/api/v1", "/course_runs/").unwrap();
        assert_eq!(url.as_str(), "https://studio.example.com/api/v1/course_runs/");

        let url = join("https://x.example.com/", "api/v1/courses/abc/?exclude_utm=1").unwrap();
        assert_eq!(url.query(), Some("exclude_utm=1"));
    }

    #[test]
    fn test_check_maps_status() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .create();

        let client = build_client(5, "test", None).unwrap();
        let resp = client.get(format!("{}/missing", server.url())).send().unwrap();
        match check(resp) {
            Err(SyncError::Http { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.status())),
        }
    }
}
