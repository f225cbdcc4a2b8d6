use anyhow::{Context, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::settings::Settings;

mod google;
mod translate;
mod vision;

pub use translate::CloudTranslation;
pub use vision::CloudVision;

/// A visual concept reported by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub description: String,
    pub score: f32,
}

impl Label {
    pub fn new(description: impl Into<String>, score: f32) -> Self {
        Self {
            description: description.into(),
            score,
        }
    }
}

pub type DetectFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Label>>> + Send + 'a>>;
pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

pub trait LabelDetector: Send + Sync {
    fn detect_labels<'a>(&'a self, image: &'a [u8], max_results: usize) -> DetectFuture<'a>;
}

/// Implementations return exactly one output per input, in input order.
pub trait TextTranslator: Send + Sync {
    fn translate<'a>(
        &'a self,
        texts: &'a [String],
        target_language: &'a str,
    ) -> TranslateFuture<'a>;
}

pub fn build_http_client(settings: &Settings) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = settings.http_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().with_context(|| "failed to create HTTP client")
}

/// Builds the Google-backed detector and translator sharing one HTTP client.
pub fn build_services(
    settings: &Settings,
    http: reqwest::Client,
) -> Result<(Arc<dyn LabelDetector>, Arc<dyn TextTranslator>)> {
    let project = settings.project_id()?;
    let client = google::GoogleClient::new(
        http,
        settings.credentials.clone(),
        Some(project.to_string()),
        settings.metadata_token_url.clone(),
    );
    let detector = CloudVision::new(client.clone(), settings.vision_endpoint.clone());
    let translator = CloudTranslation::new(
        client,
        &settings.translation_endpoint,
        project,
        &settings.location,
        settings.mime_type.clone(),
        settings.source_language.clone(),
    );
    Ok((Arc::new(detector), Arc::new(translator)))
}
