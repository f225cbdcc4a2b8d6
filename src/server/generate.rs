use axum::http::StatusCode;

use crate::hashtags::{self, ImagePayload};

use super::models::{HashtagRequest, HashtagResponse};
use super::state::ServerState;

const MISSING_IMAGE_MESSAGE: &str = "request body has no 'image_data' (base64)";

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::internal(format!("server error: {:#}", err))
    }
}

pub(crate) async fn generate_request(
    state: &ServerState,
    body: &[u8],
) -> Result<HashtagResponse, ServerError> {
    let request = parse_request(body)?;
    let Some(image_data) = request.image_data.filter(|value| !value.trim().is_empty()) else {
        return Err(ServerError::bad_request(MISSING_IMAGE_MESSAGE));
    };
    let image = ImagePayload::from_base64(&image_data)
        .map_err(|err| ServerError::bad_request(err.to_string()))?;

    let hashtags = hashtags::generate_hashtags(
        state.detector.as_ref(),
        state.translator.as_ref(),
        &image,
        &state.options,
    )
    .await?;
    Ok(HashtagResponse::success(hashtags))
}

fn parse_request(body: &[u8]) -> Result<HashtagRequest, ServerError> {
    if body.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Err(ServerError::bad_request(MISSING_IMAGE_MESSAGE));
    }
    let value = serde_json::from_slice::<serde_json::Value>(body).map_err(invalid_json)?;
    if !value.is_object() {
        return Err(ServerError::bad_request(MISSING_IMAGE_MESSAGE));
    }
    serde_json::from_value::<HashtagRequest>(value).map_err(invalid_json)
}

fn invalid_json(err: serde_json::Error) -> ServerError {
    ServerError::bad_request(format!("{}: invalid JSON body ({})", MISSING_IMAGE_MESSAGE, err))
}
