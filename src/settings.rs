use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";
pub const LEGACY_PROJECT_ENV: &str = "GCP_PROJECT";
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const PORT_ENV: &str = "PORT";

/// How outbound Google API calls are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    AccessToken(String),
    ApiKey(String),
    /// Ask the GCE / Cloud Run metadata server for a token on every call.
    MetadataServer,
}

impl Credentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::AccessToken(_) => "access-token",
            Credentials::ApiKey(_) => "api-key",
            Credentials::MetadataServer => "metadata-server",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({})", self.kind())
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub vision_endpoint: String,
    pub max_results: usize,
    pub min_score: f32,
    pub translation_endpoint: String,
    pub project: Option<String>,
    pub location: String,
    pub target_language: String,
    pub source_language: Option<String>,
    pub mime_type: String,
    pub metadata_token_url: String,
    pub http_timeout_secs: Option<u64>,
    pub credentials: Credentials,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 10 * 1024 * 1024,
            vision_endpoint: "https://vision.googleapis.com/v1".to_string(),
            max_results: 15,
            min_score: 0.7,
            translation_endpoint: "https://translation.googleapis.com/v3".to_string(),
            project: None,
            location: "global".to_string(),
            target_language: "ja".to_string(),
            source_language: None,
            mime_type: "text/plain".to_string(),
            metadata_token_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
            http_timeout_secs: None,
            credentials: Credentials::MetadataServer,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    vision: Option<VisionSettings>,
    translation: Option<TranslationSettings>,
    auth: Option<AuthSettings>,
    http: Option<HttpSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    host: Option<String>,
    port: Option<u16>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct VisionSettings {
    endpoint: Option<String>,
    max_results: Option<usize>,
    min_score: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    endpoint: Option<String>,
    project: Option<String>,
    location: Option<String>,
    target_language: Option<String>,
    source_language: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthSettings {
    metadata_token_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpSettings {
    timeout_secs: Option<u64>,
}

/// Loads the layered settings files, applies the process environment and
/// validates the result.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    load_settings_with(extra_path, get_env)
}

pub fn load_settings_with<F>(extra_path: Option<&Path>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();
    let embedded: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(embedded);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content).with_context(|| {
                format!("failed to parse settings: {}", path.display())
            })?;
        }
    }

    settings.apply_env(env);
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(host) = non_empty(server.host) {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(limit) = server.max_body_bytes
                && limit > 0
            {
                self.max_body_bytes = limit;
            }
        }
        if let Some(vision) = incoming.vision {
            if let Some(endpoint) = non_empty(vision.endpoint) {
                self.vision_endpoint = endpoint;
            }
            if let Some(max_results) = vision.max_results {
                self.max_results = max_results;
            }
            if let Some(min_score) = vision.min_score {
                self.min_score = min_score;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(endpoint) = non_empty(translation.endpoint) {
                self.translation_endpoint = endpoint;
            }
            if let Some(project) = non_empty(translation.project) {
                self.project = Some(project);
            }
            if let Some(location) = non_empty(translation.location) {
                self.location = location;
            }
            if let Some(lang) = non_empty(translation.target_language) {
                self.target_language = lang;
            }
            if let Some(lang) = non_empty(translation.source_language) {
                self.source_language = Some(lang);
            }
            if let Some(mime) = non_empty(translation.mime_type) {
                self.mime_type = mime;
            }
        }
        if let Some(auth) = incoming.auth
            && let Some(url) = non_empty(auth.metadata_token_url)
        {
            self.metadata_token_url = url;
        }
        if let Some(http) = incoming.http
            && let Some(secs) = http.timeout_secs
        {
            self.http_timeout_secs = if secs == 0 { None } else { Some(secs) };
        }
    }

    /// Environment wins over every settings file.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env(PORT_ENV) {
            match port.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => debug!("ignoring unparsable {}: '{}'", PORT_ENV, port),
            }
        }

        if let Some(project) = env(PROJECT_ENV) {
            self.project = Some(project);
        } else if let Some(project) = env(LEGACY_PROJECT_ENV) {
            debug!(
                "{} is not set; using {} ('{}')",
                PROJECT_ENV, LEGACY_PROJECT_ENV, project
            );
            self.project = Some(project);
        }

        self.credentials = if let Some(token) = env(ACCESS_TOKEN_ENV) {
            Credentials::AccessToken(token)
        } else if let Some(key) = env(API_KEY_ENV) {
            Credentials::ApiKey(key)
        } else {
            Credentials::MetadataServer
        };
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.is_none() {
            return Err(anyhow!(
                "neither {} nor {} is set (and no [translation] project in settings); translation cannot run",
                PROJECT_ENV,
                LEGACY_PROJECT_ENV
            ));
        }
        if self.max_results == 0 {
            return Err(anyhow!("[vision] max_results must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(anyhow!(
                "[vision] min_score must be within 0.0..=1.0 (got {})",
                self.min_score
            ));
        }
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("[translation] target_language is empty"));
        }
        Ok(())
    }

    pub fn project_id(&self) -> Result<&str> {
        self.project
            .as_deref()
            .ok_or_else(|| anyhow!("translation project is not configured"))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn built_in_defaults_match_service_contract() {
        let settings =
            load_settings_with(None, env_from(&[(PROJECT_ENV, "demo-project")])).unwrap();
        assert_eq!(settings.max_results, 15);
        assert!((settings.min_score - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.target_language, "ja");
        assert_eq!(settings.location, "global");
        assert_eq!(settings.mime_type, "text/plain");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.project_id().unwrap(), "demo-project");
        assert_eq!(settings.credentials, Credentials::MetadataServer);
    }

    #[test]
    fn legacy_project_variable_is_a_fallback() {
        let mut settings = Settings::default();
        settings.apply_env(env_from(&[(LEGACY_PROJECT_ENV, "legacy")]));
        assert_eq!(settings.project.as_deref(), Some("legacy"));

        let mut settings = Settings::default();
        settings.apply_env(env_from(&[
            (PROJECT_ENV, "primary"),
            (LEGACY_PROJECT_ENV, "legacy"),
        ]));
        assert_eq!(settings.project.as_deref(), Some("primary"));
    }

    #[test]
    fn missing_project_fails_fast() {
        let err = load_settings_with(None, env_from(&[])).unwrap_err();
        assert!(err.to_string().contains(PROJECT_ENV));
        assert!(err.to_string().contains(LEGACY_PROJECT_ENV));
    }

    #[test]
    fn credentials_prefer_access_token_then_api_key() {
        let mut settings = Settings::default();
        settings.apply_env(env_from(&[(ACCESS_TOKEN_ENV, "tok"), (API_KEY_ENV, "key")]));
        assert_eq!(settings.credentials, Credentials::AccessToken("tok".to_string()));

        settings.apply_env(env_from(&[(API_KEY_ENV, "key")]));
        assert_eq!(settings.credentials, Credentials::ApiKey("key".to_string()));
        assert_eq!(format!("{:?}", settings.credentials), "Credentials(api-key)");
    }

    #[test]
    fn port_env_overrides_file_and_ignores_garbage() {
        let mut settings = Settings::default();
        settings.apply_env(env_from(&[(PORT_ENV, "9090")]));
        assert_eq!(settings.port, 9090);
        settings.apply_env(env_from(&[(PORT_ENV, "not-a-port")]));
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.listen_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn merge_overrides_only_given_fields() {
        let mut settings = Settings::default();
        settings
            .merge_str(
                r#"
[vision]
min_score = 0.5

[translation]
target_language = "fr"
project = "from-file"
source_language = "  "

[http]
timeout_secs = 30
"#,
            )
            .unwrap();
        assert!((settings.min_score - 0.5).abs() < f32::EPSILON);
        assert_eq!(settings.max_results, 15);
        assert_eq!(settings.target_language, "fr");
        assert_eq!(settings.project.as_deref(), Some("from-file"));
        assert_eq!(settings.source_language, None);
        assert_eq!(settings.http_timeout_secs, Some(30));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut settings = Settings {
            project: Some("p".to_string()),
            ..Settings::default()
        };
        settings.min_score = 1.5;
        assert!(settings.validate().is_err());
        settings.min_score = 0.7;
        settings.max_results = 0;
        assert!(settings.validate().is_err());
        settings.max_results = 15;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        let err = load_settings_with(
            Some(Path::new("does-not-exist.toml")),
            env_from(&[(PROJECT_ENV, "p")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }
}
