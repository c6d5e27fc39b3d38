use serde::{Deserialize, Serialize};

fn d_host() -> String {
    "localhost".to_string()
}
fn d_port() -> u16 {
    5432
}
fn d_name() -> String {
    "sage_memory".to_string()
}
fn d_user() -> String {
    "sage".to_string()
}
fn d_pool_min() -> usize {
    5
}
fn d_pool_max() -> usize {
    20
}
fn d_command_timeout_secs() -> u64 {
    60
}

/// Connection parameters for the pgvector-backed store (§6.6 `DB_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_name")]
    pub database: String,
    #[serde(default = "d_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "d_pool_min")]
    pub pool_min: usize,
    #[serde(default = "d_pool_max")]
    pub pool_max: usize,
    #[serde(default = "d_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            database: d_name(),
            user: d_user(),
            password: String::new(),
            pool_min: d_pool_min(),
            pool_max: d_pool_max(),
            command_timeout_secs: d_command_timeout_secs(),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
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

    /// Debug-safe rendering for status/log output; never leaks the password.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "port": self.port,
            "database": self.database,
            "user": self.user,
            "password": "***",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = DbConfig::default();
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.pool_max, 20);
    }

    #[test]
    fn redacted_hides_password() {
        let mut cfg = DbConfig::default();
        cfg.password = "hunter2".into();
        let v = cfg.redacted();
        assert_eq!(v["password"], "***");
    }
}
