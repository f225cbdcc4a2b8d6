use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE as BASE64_URL_SAFE};
use tracing::{debug, warn};

use crate::providers::{Label, LabelDetector, TextTranslator};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct HashtagOptions {
    pub max_results: usize,
    pub min_score: f32,
    pub target_language: String,
}

impl Default for HashtagOptions {
    fn default() -> Self {
        Self {
            max_results: 15,
            min_score: 0.7,
            target_language: "ja".to_string(),
        }
    }
}

impl HashtagOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_results: settings.max_results,
            min_score: settings.min_score,
            target_language: settings.target_language.clone(),
        }
    }
}

/// Decoded image bytes of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    /// Accepts plain base64 (standard or URL-safe alphabet), with or without a
    /// `data:<mime>;base64,` prefix and line breaks.
    pub fn from_base64(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let encoded = match trimmed.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(";base64,")
                .map(|(_, data)| data)
                .ok_or_else(|| anyhow!("image_data data URL is not base64 encoded"))?,
            None => trimmed,
        };
        let compact = encoded
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect::<String>();
        if compact.is_empty() {
            return Err(anyhow!("image_data is empty"));
        }
        let bytes = BASE64
            .decode(&compact)
            .or_else(|_| BASE64_URL_SAFE.decode(&compact))
            .map_err(|err| anyhow!("image_data is not valid base64: {}", err))?;
        Ok(Self { bytes })
    }
}

/// Keeps descriptions scoring at least `min_score`, in detector order.
pub fn filter_labels(labels: Vec<Label>, min_score: f32) -> Vec<String> {
    labels
        .into_iter()
        .filter(|label| label.score >= min_score)
        .map(|label| label.description)
        .collect()
}

pub fn format_hashtag(text: &str) -> String {
    format!("#{}", text)
}

/// Translation failures never fail the request; the untranslated texts are
/// returned instead.
pub async fn translate_or_original(
    translator: &dyn TextTranslator,
    texts: Vec<String>,
    target_language: &str,
) -> Vec<String> {
    if texts.is_empty() {
        return texts;
    }
    match translator.translate(&texts, target_language).await {
        Ok(translated) if translated.len() == texts.len() => translated,
        Ok(translated) => {
            warn!(
                "translation returned {} text(s) for {} label(s); using original labels",
                translated.len(),
                texts.len()
            );
            texts
        }
        Err(err) => {
            warn!("translation failed; using original labels: {:#}", err);
            texts
        }
    }
}

pub async fn generate_hashtags(
    detector: &dyn LabelDetector,
    translator: &dyn TextTranslator,
    image: &ImagePayload,
    options: &HashtagOptions,
) -> Result<Vec<String>> {
    let labels = detector
        .detect_labels(&image.bytes, options.max_results)
        .await?;
    let detected = labels.len();
    let kept = filter_labels(labels, options.min_score);
    debug!(
        "kept {} of {} label(s) at score >= {}",
        kept.len(),
        detected,
        options.min_score
    );

    let texts = translate_or_original(translator, kept, &options.target_language).await;
    Ok(texts.iter().map(|text| format_hashtag(text)).collect())
}
