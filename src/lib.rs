use anyhow::Result;
use std::path::Path;

pub mod hashtags;
pub mod logging;
pub mod providers;
pub mod server;
pub mod settings;

pub use hashtags::{HashtagOptions, ImagePayload, generate_hashtags};
pub use providers::{Label, LabelDetector, TextTranslator};
pub use server::ServerState;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub settings_path: Option<String>,
    pub show_settings: bool,
}

pub async fn run(config: Config) -> Result<()> {
    let settings = resolve_settings(&config)?;
    if config.show_settings {
        println!("{}", format_settings(&settings));
        return Ok(());
    }
    server::run_server(settings).await
}

/// Settings files and environment first, then command line flags.
pub fn resolve_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, config);
    Ok(settings)
}

fn apply_overrides(settings: &mut settings::Settings, config: &Config) {
    if let Some(host) = config.host.as_deref()
        && !host.trim().is_empty()
    {
        settings.host = host.trim().to_string();
    }
    if let Some(port) = config.port {
        settings.port = port;
    }
}

fn format_settings(settings: &settings::Settings) -> String {
    let mut lines = vec![
        format!("listen\t{}", settings.listen_addr()),
        format!("max_body_bytes\t{}", settings.max_body_bytes),
        format!("vision_endpoint\t{}", settings.vision_endpoint),
        format!("max_results\t{}", settings.max_results),
        format!("min_score\t{}", settings.min_score),
        format!("translation_endpoint\t{}", settings.translation_endpoint),
        format!("project\t{}", settings.project.as_deref().unwrap_or("unset")),
        format!("location\t{}", settings.location),
        format!("target_language\t{}", settings.target_language),
    ];
    if let Some(source) = settings.source_language.as_deref() {
        lines.push(format!("source_language\t{}", source));
    }
    lines.push(format!("mime_type\t{}", settings.mime_type));
    lines.push(format!("credentials\t{}", settings.credentials.kind()));
    if let Some(secs) = settings.http_timeout_secs {
        lines.push(format!("http_timeout_secs\t{}", secs));
    }
    lines.join("\n")
}
