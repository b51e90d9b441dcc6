use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Per-environment settings, keyed by environment name.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

// Default derived via field defaults

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.name.trim().is_empty() {
            return Err("server.name must not be empty".into());
        }
        if let Some(base) = &self.server.base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err("server.base_url must start with http:// or https://".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Gateway validations
        if self.gateway.definitions_dir.as_os_str().is_empty() {
            return Err("gateway.definitions_dir must not be empty".into());
        }
        if self.gateway.request_timeout_ms == 0 {
            return Err("gateway.request_timeout_ms must be > 0".into());
        }
        // Environment headers only for allowed environments
        if !self.gateway.allowed_environments.is_empty() {
            for name in self.environments.keys() {
                if !self
                    .gateway
                    .allowed_environments
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(name))
                {
                    return Err(format!(
                        "environments.{name} is not listed in gateway.allowed_environments"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.request_timeout_ms)
    }

    /// Configured public base URL, if any. When absent the gateway derives it
    /// from each request's `Host` header.
    pub fn base_url(&self) -> Option<String> {
        self.server
            .base_url
            .as_ref()
            .map(|b| b.trim_end_matches('/').to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL, used when rewriting backend URLs in responses.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Instance name sent to backends in the `ServerName` header.
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_server_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "portico".into())
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            name: default_server_name(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Root holding the `SQL`, `Proxy`, `Composite`, `Webhooks`, `Files`
    /// and `Static` definition trees.
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,
    /// Reload definitions when files under the root change.
    #[serde(default)]
    pub watch: bool,
    /// Environments requests may target; empty accepts any.
    #[serde(default)]
    pub allowed_environments: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("endpoints")
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            watch: false,
            allowed_environments: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// Headers added to every outbound call made for this environment.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_FILE: &str = "portico.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., PORTICO__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("PORTICO")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("gateway.allowed_environments"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.gateway.definitions_dir, PathBuf::from("endpoints"));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert!(cfg.base_url().is_none());
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = AppConfig::default();
        cfg.gateway.request_timeout_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.server.base_url = Some("gw.example.com".into());
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.gateway.allowed_environments = vec!["prod".into()];
        cfg.environments
            .insert("dev".into(), EnvironmentConfig::default());
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("environments.dev"));
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let mut cfg = AppConfig::default();
        cfg.server.base_url = Some("https://gw.example.com/".into());
        assert_eq!(cfg.base_url().as_deref(), Some("https://gw.example.com"));
    }
}
