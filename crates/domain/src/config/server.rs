use serde::{Deserialize, Serialize};

fn d_host() -> String {
    "0.0.0.0".to_string()
}
fn d_port() -> u16 {
    8000
}
fn d_max_results() -> usize {
    10
}
fn d_log_dir() -> String {
    "logs".to_string()
}

/// HTTP transport bind address (§6.6 `HOST`/`PORT`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
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

/// Bearer-token gate for the HTTP transport (§4.12).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let require_auth = std::env::var("REQUIRE_AUTH")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        let bearer_token = std::env::var("SAGE_BEARER_TOKEN").ok();
        Self {
            require_auth,
            bearer_token,
        }
    }
}

/// Ambient logging destination (§6.6 `SAGE_LOG_DIR`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "d_log_dir")]
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: d_log_dir(),
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("SAGE_LOG_DIR") {
            cfg.log_dir = v;
        }
        cfg
    }
}

/// Defaults applied by the memory manager/tool layer (§6.6 `SAGE_MAX_RESULTS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDefaultsConfig {
    #[serde(default = "d_max_results")]
    pub max_results: usize,
}

impl Default for MemoryDefaultsConfig {
    fn default() -> Self {
        Self {
            max_results: d_max_results(),
        }
    }
}

impl MemoryDefaultsConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("SAGE_MAX_RESULTS") {
            if let Ok(n) = v.parse() {
                cfg.max_results = n;
            }
        }
        cfg
    }
}
