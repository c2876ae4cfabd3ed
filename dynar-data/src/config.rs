//! YAML configuration for dynamic-attribute models.
//!
//! ```yaml
//! dialect: mariadb
//! query_param_prefix: ":dcq"
//! attribute_param_prefix: ":dca"
//! models:
//!   product:
//!     dynamic_column: details
//!     columns: [id, name, details]
//! ```
//!
//! `DYNAR_DIALECT` in the environment overrides `dialect`. Configuration is
//! read once at startup; the resulting [`ModelMeta`]s are shared read-only.

use crate::entity::{ModelMeta, DEFAULT_ATTRIBUTE_PARAM_PREFIX, DEFAULT_QUERY_PARAM_PREFIX};
use crate::error::DynamicError;
use crate::query::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Environment variable overriding the configured dialect.
pub const DIALECT_ENV: &str = "DYNAR_DIALECT";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading config files.
    #[error("Config load error: {0}")]
    Load(String),
    #[error("Invalid config value for '{key}': {message}")]
    Invalid { key: String, message: String },
    #[error("No model configured for table '{0}'")]
    UnknownModel(String),
    #[error(transparent)]
    Backend(#[from] DynamicError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    pub dialect: String,
    pub query_param_prefix: String,
    pub attribute_param_prefix: String,
    pub models: BTreeMap<String, ModelConfig>,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            dialect: "mysql".to_string(),
            query_param_prefix: DEFAULT_QUERY_PARAM_PREFIX.to_string(),
            attribute_param_prefix: DEFAULT_ATTRIBUTE_PARAM_PREFIX.to_string(),
            models: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub dynamic_column: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

fn default_id_column() -> String {
    "id".to_string()
}

impl DynamicConfig {
    /// Parse and validate YAML. Environment overrides are not applied.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DynamicConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file, then apply `DYNAR_DIALECT`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        let mut config: DynamicConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            dialect = %config.dialect,
            models = config.models.len(),
            "loaded dynamic attribute config"
        );
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dialect) = lookup(DIALECT_ENV) {
            self.dialect = dialect;
        }
    }

    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        let dialect: Dialect = self.dialect.parse()?;
        dialect.dynamic_encoder()?;
        Ok(dialect)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dialect()?;
        for (key, prefix) in [
            ("query_param_prefix", &self.query_param_prefix),
            ("attribute_param_prefix", &self.attribute_param_prefix),
        ] {
            let valid = prefix.len() > 1
                && prefix.starts_with(':')
                && prefix[1..].chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    message: format!("`{prefix}` is not a named placeholder prefix"),
                });
            }
        }
        if self.query_param_prefix == self.attribute_param_prefix {
            return Err(ConfigError::Invalid {
                key: "attribute_param_prefix".to_string(),
                message: "must differ from query_param_prefix".to_string(),
            });
        }
        for (table, model) in &self.models {
            if model.dynamic_column.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: format!("models.{table}.dynamic_column"),
                    message: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Metadata for the model stored in `table`.
    pub fn model(&self, table: &str) -> Result<Arc<ModelMeta>, ConfigError> {
        let model = self
            .models
            .get(table)
            .ok_or_else(|| ConfigError::UnknownModel(table.to_string()))?;
        let meta = ModelMeta::new(table)
            .id_column(&model.id_column)
            .columns(model.columns.as_slice())
            .dynamic_column(&model.dynamic_column)
            .dialect(self.dialect()?)
            .param_prefixes(&self.query_param_prefix, &self.attribute_param_prefix);
        Ok(Arc::new(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
dialect: mariadb
models:
  product:
    dynamic_column: details
    columns: [id, name, details]
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = DynamicConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::MySql);
        assert_eq!(config.query_param_prefix, ":dcq");
        let meta = config.model("product").unwrap();
        assert_eq!(meta.dynamic_column_name().unwrap(), "details");
        assert_eq!(meta.primary_key(), "id");
        assert!(meta.has_column("name"));
    }

    #[test]
    fn test_unknown_model() {
        let config = DynamicConfig::from_yaml_str(YAML).unwrap();
        assert!(matches!(
            config.model("order"),
            Err(ConfigError::UnknownModel(t)) if t == "order"
        ));
    }

    #[test]
    fn test_unsupported_dialect_is_rejected() {
        let err = DynamicConfig::from_yaml_str("dialect: sqlite").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Backend(DynamicError::UnsupportedBackend { .. })
        ));
        let err = DynamicConfig::from_yaml_str("dialect: oracle").unwrap_err();
        assert!(matches!(err, ConfigError::Backend(_)));
    }

    #[test]
    fn test_invalid_prefixes() {
        let err = DynamicConfig::from_yaml_str("query_param_prefix: dcq").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "query_param_prefix"));
        let err = DynamicConfig::from_yaml_str("attribute_param_prefix: \":dcq\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_env_override() {
        let mut config = DynamicConfig::from_yaml_str(YAML).unwrap();
        config.apply_overrides(|key| (key == DIALECT_ENV).then(|| "postgres".to_string()));
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = DynamicConfig::load(file.path()).unwrap();
        assert!(config.models.contains_key("product"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DynamicConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
