//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::AppConfig;

/// Prefix for environment overrides, e.g. `BILLSCAN__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "BILLSCAN";

/// Load configuration from an optional `config.*` file and env vars
pub fn load_config() -> ServiceResult<AppConfig> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("crops.column_splits"),
        );

    deserialize(builder.build().map_err(|e| ServiceError::Config {
        message: format!("Failed to build config: {}", e),
    })?)
}

fn deserialize(config: Config) -> ServiceResult<AppConfig> {
    config
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(source: &str) -> ServiceResult<AppConfig> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap();
        deserialize(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = from_toml("").unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.model.top_k, 32);
        assert_eq!(config.acquisition.render_dpi, 300);
        assert_eq!(config.crops.column_splits, vec![2, 3, 4]);
        assert_eq!(config.crops.max_crops_per_page, 10);
        assert!(config.crops.retry_empty_full_page);
        assert_eq!(config.preprocessing.margin_threshold, 240);
        assert!(config.preprocessing.deskew);
        assert!(!config.acquisition.allow_local_paths);
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config = from_toml(
            r#"
            [model]
            model = "llava:13b"

            [crops]
            column_splits = [2]
            concurrency = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.model.model, "llava:13b");
        assert_eq!(config.model.base_url, "http://localhost:11434");
        assert_eq!(config.crops.column_splits, vec![2]);
        assert_eq!(config.crops.concurrency, 8);
        assert_eq!(config.crops.window_width, 3000);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let err = from_toml("[server]\nport = \"not a port\"").unwrap_err();
        assert!(matches!(err, ServiceError::Config { .. }));
    }
}
