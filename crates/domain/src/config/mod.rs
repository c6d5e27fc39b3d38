//! Configuration: env + optional file merge, one struct per concern, the way
//! the teacher's `crates/domain/src/config/*.rs` splits its own config.

mod database;
mod embedding;
mod server;

pub use database::DbConfig;
pub use embedding::{EmbeddingConfig, GeneratorConfig};
pub use server::{AuthConfig, HttpConfig, LoggingConfig, MemoryDefaultsConfig};

use serde::{Deserialize, Serialize};

/// Top-level assembled configuration for the sage memory service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SageConfig {
    #[serde(default)]
    pub database: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub memory: MemoryDefaultsConfig,
}

impl SageConfig {
    /// Load from an optional TOML file, then apply environment overrides —
    /// env wins over file, file wins over built-in defaults.
    pub fn load(file_path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        let mut cfg = if let Some(path) = file_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text).map_err(|e| crate::error::Error::configuration(format!(
                    "failed to parse config file {}: {e}",
                    path.display()
                )))?
            } else {
                Self::default()
            }
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        self.database = DbConfig::from_env_or(&self.database);
        self.embedding = EmbeddingConfig::from_env_or(&self.embedding);
        self.generator = GeneratorConfig::from_env_or(&self.generator);
        self.http = HttpConfig::from_env_or(&self.http);
        self.auth = AuthConfig::from_env();
        self.logging = LoggingConfig::from_env_or(&self.logging);
        self.memory = MemoryDefaultsConfig::from_env_or(&self.memory);
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.embedding.api_key.is_empty() {
            return Err(crate::error::Error::configuration(
                "SILICONFLOW_API_KEY environment variable is not set",
            ));
        }
        Ok(())
    }

    /// Debug-safe rendering for `get_status`/logs: secrets redacted.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "database": self.database.redacted(),
            "embedding": {"model": self.embedding.model, "device": self.embedding.device, "api_key": "***"},
            "generator": {"model": self.generator.model, "api_key": "***"},
            "http": {"host": self.http.host, "port": self.http.port},
            "auth": {"require_auth": self.auth.require_auth},
            "logging": {"log_dir": self.logging.log_dir},
            "memory": {"max_results": self.memory.max_results},
        })
    }
}

// Small helper trait so `apply_env` can fall back to an existing (e.g.
// file-loaded) value instead of the hardcoded default when no env var is
// set. Each concern's `from_env()` already starts from `Default`; layering
// it on top of a file-provided base means re-reading env on top of that base.
trait FromEnvOr: Sized + Clone {
    fn from_env_or(base: &Self) -> Self;
}

impl FromEnvOr for DbConfig {
    fn from_env_or(base: &Self) -> Self {
        let mut cfg = base.clone();
        if let Ok(v) = std::env::var("DB_HOST") {
            cfg.host = v;
        }
        if let Ok(v) = std::env::var("DB_PORT") {
            if let Ok(p) = v.parse() {
                cfg.port = p;
            }
        }
        if let Ok(v) = std::env::var("DB_NAME") {
            cfg.database = v;
        }
        if let Ok(v) = std::env::var("DB_USER") {
            cfg.user = v;
        }
        if let Ok(v) = std::env::var("DB_PASSWORD") {
            cfg.password = v;
        }
        cfg
    }
}

impl FromEnvOr for EmbeddingConfig {
    fn from_env_or(base: &Self) -> Self {
        let mut cfg = base.clone();
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            cfg.model = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_DEVICE") {
            cfg.device = v;
        }
        if let Ok(v) = std::env::var("SILICONFLOW_API_KEY") {
            cfg.api_key = v;
        }
        cfg
    }
}

impl FromEnvOr for GeneratorConfig {
    fn from_env_or(base: &Self) -> Self {
        let mut cfg = base.clone();
        if let Ok(v) = std::env::var("SILICONFLOW_API_KEY") {
            cfg.api_key = v;
        }
        cfg
    }
}

impl FromEnvOr for HttpConfig {
    fn from_env_or(base: &Self) -> Self {
        let mut cfg = base.clone();
        if let Ok(v) = std::env::var("HOST") {
            cfg.host = v;
        }
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(p) = v.parse() {
                cfg.port = p;
            }
        }
        cfg
    }
}

impl FromEnvOr for LoggingConfig {
    fn from_env_or(base: &Self) -> Self {
        let mut cfg = base.clone();
        if let Ok(v) = std::env::var("SAGE_LOG_DIR") {
            cfg.log_dir = v;
        }
        cfg
    }
}

impl FromEnvOr for MemoryDefaultsConfig {
    fn from_env_or(base: &Self) -> Self {
        let mut cfg = base.clone();
        if let Ok(v) = std::env::var("SAGE_MAX_RESULTS") {
            if let Ok(n) = v.parse() {
                cfg.max_results = n;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_then_validate_fails_without_api_key() {
        std::env::remove_var("SILICONFLOW_API_KEY");
        let err = SageConfig::load(None).unwrap_err();
        assert!(matches!(err, crate::error::Error::Configuration { .. }));
    }

    #[test]
    fn redacted_never_contains_raw_secrets() {
        let mut cfg = SageConfig::default();
        cfg.embedding.api_key = "sk-secret".into();
        cfg.database.password = "hunter2".into();
        let redacted = serde_json::to_string(&cfg.redacted()).unwrap();
        assert!(!redacted.contains("sk-secret"));
        assert!(!redacted.contains("hunter2"));
    }
}
