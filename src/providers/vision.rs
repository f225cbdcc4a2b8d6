use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::google::{GoogleClient, GoogleStatus};
use super::{DetectFuture, Label, LabelDetector};

const SERVICE: &str = "Vision";

/// Google Cloud Vision `images:annotate` with the `LABEL_DETECTION` feature.
#[derive(Debug, Clone)]
pub struct CloudVision {
    client: GoogleClient,
    endpoint: String,
}

impl CloudVision {
    pub(crate) fn new(client: GoogleClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

impl LabelDetector for CloudVision {
    fn detect_labels<'a>(&'a self, image: &'a [u8], max_results: usize) -> DetectFuture<'a> {
        Box::pin(async move {
            let url = format!("{}/images:annotate", self.endpoint);
            let body = annotate_request_body(image, max_results);
            let text = self.client.post_json(SERVICE, &url, &body).await?;
            let labels = extract_labels(&text)?;
            debug!("{} returned {} label(s)", SERVICE, labels.len());
            Ok(labels)
        })
    }
}

fn annotate_request_body(image: &[u8], max_results: usize) -> Value {
    json!({
        "requests": [
            {
                "features": [
                    {
                        "maxResults": max_results,
                        "type": "LABEL_DETECTION"
                    }
                ],
                "image": {
                    "content": BASE64.encode(image)
                }
            }
        ]
    })
}

fn extract_labels(text: &str) -> Result<Vec<Label>> {
    let payload: AnnotateResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Vision response JSON: {}", err))?;
    let Some(response) = payload.responses.into_iter().next() else {
        return Err(anyhow!("no annotation result returned from Vision"));
    };
    if let Some(error) = response.error {
        return Err(anyhow!("Vision annotation failed: {}", error.describe()));
    }
    Ok(response
        .label_annotations
        .into_iter()
        .map(|annotation| Label {
            description: annotation.description,
            score: annotation.score,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
struct AnnotateImageResponse {
    #[serde(rename = "labelAnnotations", default)]
    label_annotations: Vec<EntityAnnotation>,
    error: Option<GoogleStatus>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f32,
}
