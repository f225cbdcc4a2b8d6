use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::hashtags::HashtagOptions;
use crate::providers;
use crate::settings::Settings;

use super::generate::{ServerError, generate_request};
use super::models::{ErrorResponse, HashtagResponse};
use super::state::ServerState;

/// Builds the Google clients once and serves until the listener fails.
pub async fn run_server(settings: Settings) -> Result<()> {
    let http = providers::build_http_client(&settings)?;
    let (detector, translator) = providers::build_services(&settings, http)?;
    let state = ServerState::new(detector, translator, HashtagOptions::from_settings(&settings));

    let addr = settings.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!(
        "listening on {} (project {}, target language {}, credentials {})",
        addr,
        settings.project_id()?,
        settings.target_language,
        settings.credentials.kind()
    );
    serve(listener, router(state, settings.max_body_bytes)).await
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: ServerState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(hello).post(hashtags))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn hello() -> &'static str {
    "Hello World"
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn hashtags(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<HashtagResponse>, (StatusCode, Json<ErrorResponse>)> {
    let result = match body {
        Ok(body) => tokio::spawn(async move { generate_request(state.as_ref(), &body).await })
            .await
            .unwrap_or_else(|err| {
                Err(ServerError::internal(format!("server task failed: {}", err)))
            }),
        Err(rejection) => Err(ServerError::with_status(
            rejection.status(),
            rejection.body_text(),
        )),
    };

    match result {
        Ok(response) => {
            info!("generated {} hashtag(s)", response.hashtags.len());
            Ok(Json(response))
        }
        Err(err) => {
            if err.status.is_server_error() {
                error!("hashtag generation failed: {}", err.message);
            } else {
                warn!("rejected request: {}", err.message);
            }
            Err((err.status, Json(ErrorResponse { error: err.message })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashtags::tests::{FakeDetector, FakeTranslator};
    use crate::providers::Label;
    use axum::response::IntoResponse;
    use serde_json::{Value, json};

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState::new(
            Arc::new(FakeDetector::returning(vec![
                Label::new("Cat", 0.9),
                Label::new("Sky", 0.5),
            ])),
            Arc::new(FakeTranslator::broken()),
            HashtagOptions::default(),
        ))
    }

    async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn hello_is_plain_text() {
        assert_eq!(hello().await, "Hello World");
    }

    #[tokio::test]
    async fn post_without_image_is_400_with_error_field() {
        let response = hashtags(State(state()), Ok(Bytes::from_static(b"{}")))
            .await
            .into_response();
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("image_data"));
    }

    #[tokio::test]
    async fn broken_translation_still_returns_original_hashtags() {
        let response = hashtags(
            State(state()),
            Ok(Bytes::from_static(br#"{"image_data": "aGVsbG8="}"#)),
        )
        .await
        .into_response();
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success", "hashtags": ["#Cat"]}));
    }

    #[test]
    fn cors_headers_are_permissive() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET,POST,OPTIONS");
    }
}
