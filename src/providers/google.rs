use anyhow::{Context, Result, anyhow};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::settings::Credentials;

/// Shared HTTP plumbing for the Google Cloud REST APIs: one pooled client,
/// the resolved credentials and the quota project.
#[derive(Debug, Clone)]
pub(crate) struct GoogleClient {
    http: reqwest::Client,
    credentials: Credentials,
    project: Option<String>,
    metadata_token_url: String,
}

impl GoogleClient {
    pub(crate) fn new(
        http: reqwest::Client,
        credentials: Credentials,
        project: Option<String>,
        metadata_token_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            project,
            metadata_token_url: metadata_token_url.into(),
        }
    }

    pub(crate) async fn post_json(&self, service: &str, url: &str, body: &Value) -> Result<String> {
        let request = self.authorize(self.http.post(url).json(body)).await?;
        let response = request
            .send()
            .await
            .with_context(|| format!("{} request failed", service))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read {} response", service))?;
        if status.is_success() {
            return Ok(text);
        }
        Err(anyhow!(
            "{} API error ({}): {}",
            service,
            status,
            extract_google_error(&text).unwrap_or(text)
        ))
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let request = match &self.project {
            Some(project) => request.header("x-goog-user-project", project.as_str()),
            None => request,
        };
        match &self.credentials {
            Credentials::AccessToken(token) => Ok(request.bearer_auth(token)),
            Credentials::ApiKey(key) => Ok(request.header("x-goog-api-key", key.as_str())),
            Credentials::MetadataServer => {
                let token = self.fetch_metadata_token().await?;
                Ok(request.bearer_auth(token))
            }
        }
    }

    async fn fetch_metadata_token(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct MetadataToken {
            access_token: String,
        }

        debug!("requesting access token from {}", self.metadata_token_url);
        let response = self
            .http
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .with_context(|| "failed to reach the metadata server for an access token")?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| "failed to read the metadata server response")?;
        if !status.is_success() {
            return Err(anyhow!("metadata server error ({}): {}", status, text));
        }
        let token: MetadataToken = serde_json::from_str(&text)
            .map_err(|err| anyhow!("failed to parse metadata token JSON: {}", err))?;
        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleStatus {
    pub(crate) code: Option<i32>,
    pub(crate) message: Option<String>,
    pub(crate) status: Option<String>,
}

impl GoogleStatus {
    pub(crate) fn describe(self) -> String {
        format_error_parts(self.message, self.status, self.code.map(|value| value.to_string()))
    }
}

pub(crate) fn extract_google_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GoogleStatus>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    Some(parsed.error?.describe())
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::io::{Read, Write};
    use tokio::net::TcpListener;

    async fn metadata_token(headers: HeaderMap) -> (StatusCode, &'static str) {
        match headers.get("metadata-flavor") {
            Some(value) if value == "Google" => (
                StatusCode::OK,
                r#"{"access_token":"meta-token","expires_in":3599,"token_type":"Bearer"}"#,
            ),
            _ => (StatusCode::FORBIDDEN, "missing Metadata-Flavor header"),
        }
    }

    async fn metadata_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/token", addr)
    }

    fn metadata_client(token_url: String) -> GoogleClient {
        GoogleClient::new(
            reqwest::Client::new(),
            Credentials::MetadataServer,
            None,
            token_url,
        )
    }

    /// Answers one request with a body shorter than its content-length.
    fn truncated_body_server() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buf).unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\n{\"access")
                .unwrap();
        });
        format!("http://{}/token", addr)
    }

    #[tokio::test]
    async fn metadata_token_is_requested_with_flavor_header() {
        let url = metadata_server(Router::new().route("/token", get(metadata_token))).await;
        let token = metadata_client(url).fetch_metadata_token().await.unwrap();
        assert_eq!(token, "meta-token");
    }

    #[tokio::test]
    async fn metadata_server_failure_is_reported() {
        let app = Router::new().route(
            "/token",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "no service account") }),
        );
        let url = metadata_server(app).await;
        let err = metadata_client(url).fetch_metadata_token().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "metadata server error (500 Internal Server Error): no service account"
        );
    }

    #[tokio::test]
    async fn truncated_metadata_body_is_an_error() {
        let err = metadata_client(truncated_body_server())
            .fetch_metadata_token()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to read the metadata server response");
    }

    #[test]
    fn condenses_google_error_bodies() {
        let body = r#"{"error":{"code":403,"message":"Cloud Translation API has not been used","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            extract_google_error(body).as_deref(),
            Some("Cloud Translation API has not been used | type: PERMISSION_DENIED | code: 403")
        );
    }

    #[test]
    fn non_google_bodies_are_left_alone() {
        assert_eq!(extract_google_error("upstream connect error"), None);
        assert_eq!(extract_google_error(r#"{"other":1}"#), None);
        assert_eq!(
            extract_google_error(r#"{"error":{}}"#).as_deref(),
            Some("unknown error")
        );
    }
}
