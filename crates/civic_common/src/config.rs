//! Service configuration, read from the environment.
//!
//! There is no config file: the daemon runs twelve-factor style, and a
//! backend whose credentials are absent is simply not configured. The
//! daemon boots anyway and degrades, so a half-provisioned deploy still
//! answers health checks honestly.

use std::env;

/// Default chat port.
pub const DEFAULT_PORT: u16 = 5000;
/// Default model served by the text-first inference endpoint.
pub const DEFAULT_TEXT_MODEL: &str = "claude-4-5-sonnet";
/// Default model for the vision-capable endpoint.
pub const DEFAULT_VISION_MODEL: &str = "claude-sonnet-4-20250514";
/// Default geocoding service.
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Credentials for the text-first chat backend.
#[derive(Debug, Clone)]
pub struct TextBackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Credentials for the vision-capable chat backend.
#[derive(Debug, Clone)]
pub struct VisionBackendConfig {
    pub api_key: String,
    pub model: String,
}

/// Credentials for the case desk. The access token is provisioned out
/// of band; this service never performs the auth dance itself.
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub instance_url: String,
    pub access_token: String,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub text_backend: Option<TextBackendConfig>,
    pub vision_backend: Option<VisionBackendConfig>,
    pub salesforce: Option<SalesforceConfig>,
    pub geocoder_url: String,
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an injectable lookup (tests pass a map
    /// instead of mutating process globals).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let text_backend = match (get("INFERENCE_URL"), get("INFERENCE_KEY")) {
            (Some(base_url), Some(api_key)) => Some(TextBackendConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                model: get("INFERENCE_MODEL_ID").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            }),
            _ => None,
        };

        let vision_backend = get("CLAUDE_API_KEY").map(|api_key| VisionBackendConfig {
            api_key,
            model: get("CLAUDE_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
        });

        let salesforce = match (get("SALESFORCE_INSTANCE_URL"), get("SALESFORCE_ACCESS_TOKEN")) {
            (Some(instance_url), Some(access_token)) => Some(SalesforceConfig {
                instance_url: instance_url.trim_end_matches('/').to_string(),
                access_token,
            }),
            _ => None,
        };

        let port = get("PORT")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let geocoder_url = get("GEOCODER_URL")
            .unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            port,
            text_backend,
            vision_backend,
            salesforce,
            geocoder_url,
        }
    }

    /// One line per dependency for the boot banner. Never includes
    /// secrets.
    pub fn summary_lines(&self) -> Vec<String> {
        let state = |on: bool| if on { "configured" } else { "not configured" };
        vec![
            format!(
                "text backend: {}",
                self.text_backend
                    .as_ref()
                    .map(|b| format!("configured (model {})", b.model))
                    .unwrap_or_else(|| "not configured".to_string())
            ),
            format!(
                "vision backend: {}",
                self.vision_backend
                    .as_ref()
                    .map(|b| format!("configured (model {})", b.model))
                    .unwrap_or_else(|| "not configured".to_string())
            ),
            format!("salesforce: {}", state(self.salesforce.is_some())),
            format!("geocoder: {}", self.geocoder_url),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_empty_environment_leaves_everything_unconfigured() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.text_backend.is_none());
        assert!(config.vision_backend.is_none());
        assert!(config.salesforce.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.geocoder_url, DEFAULT_GEOCODER_URL);
    }

    #[test]
    fn test_text_backend_requires_url_and_key() {
        let config = Config::from_lookup(lookup(&[("INFERENCE_URL", "https://ai.example.com")]));
        assert!(config.text_backend.is_none());

        let config = Config::from_lookup(lookup(&[
            ("INFERENCE_URL", "https://ai.example.com/"),
            ("INFERENCE_KEY", "sk-test"),
        ]));
        let backend = config.text_backend.unwrap();
        assert_eq!(backend.base_url, "https://ai.example.com");
        assert_eq!(backend.model, DEFAULT_TEXT_MODEL);
    }

    #[test]
    fn test_model_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("INFERENCE_URL", "https://ai.example.com"),
            ("INFERENCE_KEY", "sk-test"),
            ("INFERENCE_MODEL_ID", "gpt-oss-120b"),
            ("CLAUDE_API_KEY", "sk-ant"),
            ("CLAUDE_MODEL", "claude-opus-4-1"),
        ]));
        assert_eq!(config.text_backend.unwrap().model, "gpt-oss-120b");
        assert_eq!(config.vision_backend.unwrap().model, "claude-opus-4-1");
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = Config::from_lookup(lookup(&[
            ("CLAUDE_API_KEY", "  "),
            ("SALESFORCE_INSTANCE_URL", "https://org.my.salesforce.com"),
            ("SALESFORCE_ACCESS_TOKEN", ""),
        ]));
        assert!(config.vision_backend.is_none());
        assert!(config.salesforce.is_none());
    }

    #[test]
    fn test_unparseable_port_falls_back() {
        let config = Config::from_lookup(lookup(&[("PORT", "eighty")]));
        assert_eq!(config.port, DEFAULT_PORT);

        let config = Config::from_lookup(lookup(&[("PORT", "8080")]));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_summary_lines_never_leak_secrets() {
        let config = Config::from_lookup(lookup(&[
            ("INFERENCE_URL", "https://ai.example.com"),
            ("INFERENCE_KEY", "sk-very-secret"),
            ("CLAUDE_API_KEY", "sk-ant-secret"),
            ("SALESFORCE_ACCESS_TOKEN", "00Dsecret"),
            ("SALESFORCE_INSTANCE_URL", "https://org.my.salesforce.com"),
        ]));
        let banner = config.summary_lines().join("\n");
        assert!(!banner.contains("secret"));
        assert!(banner.contains("text backend: configured"));
        assert!(banner.contains("salesforce: configured"));
    }
}
