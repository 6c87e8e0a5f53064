//! Global configuration loader for Colloquy.
//!
//! Reads `config.toml` from the data directory (`~/.colloquy/` unless
//! `COLLOQUY_DATA_DIR` points elsewhere) and deserializes it into
//! [`GlobalConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use colloquy_types::config::GlobalConfig;
use colloquy_types::error::ConfigError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "COLLOQUY_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory: `$COLLOQUY_DATA_DIR`, else `~/.colloquy`,
/// else `./.colloquy` when no home directory is known.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".colloquy")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and
///   returns the default.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    if !tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
        tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
        return GlobalConfig::default();
    }

    match load_config_file(&config_path).await {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            GlobalConfig::default()
        }
    }
}

/// Load configuration from an explicit path. Unlike [`load_global_config`],
/// every failure is reported to the caller.
pub async fn load_config_file(path: &Path) -> Result<GlobalConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    toml::from_str::<GlobalConfig>(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Read an API key from the environment variable named in the config.
pub fn resolve_api_key(env_name: &str) -> Result<SecretString, ConfigError> {
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(ConfigError::MissingEnv(env_name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_types::config::CacheLookupPolicy;
    use colloquy_types::llm::BackendKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cache.max_size, 100);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
port = 8080

[cache]
max_size = 10
lookup = "exact_then_fuzzy"

[backends]
priority = ["local_runtime", "remote_router"]

[backends.local]
default_model = "mistral"
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.lookup, CacheLookupPolicy::ExactThenFuzzy);
        assert_eq!(
            config.backends.priority,
            vec![BackendKind::LocalRuntime, BackendKind::RemoteRouter]
        );
        assert_eq!(config.backends.local.default_model, "mistral");
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.server.port, 3000);
    }

    #[tokio::test]
    async fn load_config_file_reports_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = load_config_file(&tmp.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, "[cache]\nmax_size = \"many\"").await.unwrap();
        let bad = load_config_file(&path).await;
        assert!(matches!(bad, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn resolve_api_key_missing_env() {
        let err = resolve_api_key("COLLOQUY_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(name) if name == "COLLOQUY_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
