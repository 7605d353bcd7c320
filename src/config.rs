use crate::error::{ConfigError, ValidationError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Backend descriptor for one logical model: where to send the request and
/// which credential to attach. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub model_name: String,
    pub svc_name: String,
    pub svc_port: u16,
    pub api_key: String,
}

impl ModelConfig {
    pub fn backend_url(&self, api_path: &str) -> String {
        if api_path.starts_with('/') {
            format!("http://{}:{}{}", self.svc_name, self.svc_port, api_path)
        } else {
            format!("http://{}:{}/{}", self.svc_name, self.svc_port, api_path)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    model_config: Vec<ModelConfig>,
}

/// Model registry, loaded once at startup and shared read-only behind an
/// `Arc` (a future hot reload swaps the whole `Arc`, readers never lock).
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    models: HashMap<String, ModelConfig>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
        Self::parse(&raw)
    }

    /// Strict decode: unknown fields and missing fields both fail closed.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_json::from_str(raw).map_err(|e| match e.classify() {
                serde_json::error::Category::Data => ConfigError::MissingField(e.to_string()),
                _ => ConfigError::Malformed(e.to_string()),
            })?;
        let mut models = HashMap::new();
        for model in file.model_config {
            // last write wins on duplicate model names
            models.insert(model.model_name.clone(), model);
        }
        Ok(ServerConfig { models })
    }

    /// Exact-match lookup only; an absent name reports every loaded name.
    pub fn resolve(&self, model_name: &str) -> Result<&ModelConfig, ValidationError> {
        self.models
            .get(model_name)
            .ok_or_else(|| ValidationError::UnknownModel {
                model_name: model_name.to_string(),
                available: self.available_models(),
            })
    }

    pub fn available_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "model_config": [
            {"model_name": "m1", "svc_name": "m1-svc", "svc_port": 9001, "api_key": "key-1"},
            {"model_name": "m2", "svc_name": "m2-svc", "svc_port": 9002, "api_key": "key-2"}
        ]
    }"#;

    #[test]
    fn parse_and_resolve() {
        let config = ServerConfig::parse(CONFIG).unwrap();
        let m1 = config.resolve("m1").unwrap();
        assert_eq!(m1.svc_name, "m1-svc");
        assert_eq!(m1.svc_port, 9001);
        assert_eq!(m1.api_key, "key-1");
        assert_eq!(m1.backend_url("/v1/chat/completions"), "http://m1-svc:9001/v1/chat/completions");
    }

    #[test]
    fn resolve_unknown_lists_available() {
        let config = ServerConfig::parse(CONFIG).unwrap();
        let err = config.resolve("m3").unwrap_err();
        match err {
            ValidationError::UnknownModel {
                model_name,
                available,
            } => {
                assert_eq!(model_name, "m3");
                assert_eq!(available, vec!["m1".to_string(), "m2".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let raw = r#"{
            "model_config": [
                {"model_name": "m1", "svc_name": "old", "svc_port": 1, "api_key": "a"},
                {"model_name": "m1", "svc_name": "new", "svc_port": 2, "api_key": "b"}
            ]
        }"#;
        let config = ServerConfig::parse(raw).unwrap();
        assert_eq!(config.resolve("m1").unwrap().svc_name, "new");
    }

    #[test]
    fn missing_field_fails_closed() {
        let raw = r#"{"model_config": [{"model_name": "m1", "svc_name": "s", "svc_port": 1}]}"#;
        assert!(matches!(
            ServerConfig::parse(raw),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn unknown_field_fails_closed() {
        let raw = r#"{"model_config": [{"model_name": "m1", "svc_name": "s", "svc_port": 1, "api_key": "k", "extra": true}]}"#;
        assert!(matches!(
            ServerConfig::parse(raw),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            ServerConfig::parse("{not json"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn absent_file_is_not_found() {
        let err = ServerConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
