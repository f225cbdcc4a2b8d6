use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::google::GoogleClient;
use super::{TextTranslator, TranslateFuture};

const SERVICE: &str = "Translation";

/// Google Cloud Translation v3 `translateText`.
#[derive(Debug, Clone)]
pub struct CloudTranslation {
    client: GoogleClient,
    url: String,
    mime_type: String,
    source_language: Option<String>,
}

impl CloudTranslation {
    pub(crate) fn new(
        client: GoogleClient,
        endpoint: &str,
        project: &str,
        location: &str,
        mime_type: impl Into<String>,
        source_language: Option<String>,
    ) -> Self {
        let parent = parent_resource(project, location);
        Self {
            client,
            url: format!("{}/{}:translateText", endpoint.trim_end_matches('/'), parent),
            mime_type: mime_type.into(),
            source_language,
        }
    }
}

impl TextTranslator for CloudTranslation {
    fn translate<'a>(
        &'a self,
        texts: &'a [String],
        target_language: &'a str,
    ) -> TranslateFuture<'a> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let body = translate_request_body(
                texts,
                target_language,
                &self.mime_type,
                self.source_language.as_deref(),
            );
            let text = self.client.post_json(SERVICE, &self.url, &body).await?;
            let translations = extract_translations(&text, texts.len())?;
            debug!(
                "{} translated {} text(s) to {}",
                SERVICE,
                translations.len(),
                target_language
            );
            Ok(translations)
        })
    }
}

pub(crate) fn parent_resource(project: &str, location: &str) -> String {
    format!("projects/{}/locations/{}", project, location)
}

fn translate_request_body(
    texts: &[String],
    target_language: &str,
    mime_type: &str,
    source_language: Option<&str>,
) -> Value {
    let mut body = Map::new();
    body.insert("contents".to_string(), json!(texts));
    body.insert("mimeType".to_string(), json!(mime_type));
    if let Some(source) = source_language {
        body.insert("sourceLanguageCode".to_string(), json!(source));
    }
    body.insert("targetLanguageCode".to_string(), json!(target_language));
    Value::Object(body)
}

fn extract_translations(text: &str, expected: usize) -> Result<Vec<String>> {
    let payload: TranslateResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Translation response JSON: {}", err))?;
    if payload.translations.len() != expected {
        return Err(anyhow!(
            "Translation returned {} result(s) for {} input(s)",
            payload.translations.len(),
            expected
        ));
    }
    Ok(payload
        .translations
        .into_iter()
        .map(|translation| translation.translated_text)
        .collect())
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText", default)]
    translated_text: String,
}
