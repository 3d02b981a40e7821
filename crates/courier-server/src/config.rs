//! Server configuration.
//!
//! Configuration is layered from:
//! - The file named by `COURIER_CONFIG`, or else the first existing file of
//!   `courier.toml`, `/etc/courier/courier.toml`, `~/.config/courier/courier.toml`
//! - Environment variables (`COURIER__PORT`, `COURIER__BROKER__DISPATCH_POLICY`, ...)
//!
//! `COURIER_HOST` and `COURIER_PORT` override the built-in defaults.

use anyhow::{Context, Result};
use courier_core::{BrokerConfig, DispatchPolicy, RouterConfig};
use courier_protocol::{capabilities, codec::DEFAULT_MAX_FRAME_SIZE, Symbol};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Environment variable naming an explicit config file.
const CONFIG_PATH_ENV: &str = "COURIER_CONFIG";

const CONFIG_PATHS: [&str; 3] = [
    "courier.toml",
    "/etc/courier/courier.toml",
    "~/.config/courier/courier.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport bridge configuration.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Broker behavior.
    #[serde(default)]
    pub broker: BrokerSection,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Path of the WebSocket endpoint.
    #[serde(default = "default_bridge_path")]
    pub path: String,

    /// Maximum encoded frame size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    /// Consumer order of full-queue dispatch.
    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,

    /// Offer `ANONYMOUS-RELAY` on every connection.
    #[serde(default = "default_true")]
    pub anonymous_relay: bool,

    /// Prefix of dynamically allocated queue addresses.
    #[serde(default)]
    pub dynamic_address_prefix: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("COURIER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("COURIER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5672)
}

fn default_true() -> bool {
    true
}

fn default_bridge_path() -> String {
    "/bridge".to_string()
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bridge: BridgeConfig::default(),
            broker: BrokerSection::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            path: default_bridge_path(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            dispatch_policy: DispatchPolicy::default(),
            anonymous_relay: true,
            dynamic_address_prefix: String::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `COURIER_CONFIG` or the first config file
    /// found, layered with `COURIER__` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `COURIER_CONFIG` names a missing file, or if a
    /// config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(shellexpand::tilde(&explicit).into_owned());
        }

        let path = CONFIG_PATHS
            .iter()
            .map(|p| shellexpand::tilde(p).into_owned())
            .find(|p| Path::new(p).exists());

        Self::from_sources(path.as_deref().map(Path::new), environment())
    }

    /// Load configuration from a specific file, layered with the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_sources(Some(path.as_ref()), environment())
    }

    fn from_sources(path: Option<&Path>, env: ::config::Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        let what = path.map_or_else(|| "environment".to_string(), |p| p.display().to_string());
        builder
            .add_source(env)
            .build()
            .and_then(|settings| settings.try_deserialize::<Self>())
            .with_context(|| format!("Failed to load configuration from {what}"))
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Broker configuration derived from the `[broker]` section.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        let offered_capabilities = if self.broker.anonymous_relay {
            vec![Symbol::from(capabilities::ANONYMOUS_RELAY)]
        } else {
            Vec::new()
        };

        BrokerConfig {
            router: RouterConfig {
                dispatch_policy: self.broker.dispatch_policy,
                dynamic_address_prefix: self.broker.dynamic_address_prefix.clone(),
            },
            offered_capabilities,
        }
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("COURIER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bridge.path, "/bridge");
        assert_eq!(config.bridge.max_frame_size, 1024 * 1024);
        assert_eq!(config.broker.dispatch_policy, DispatchPolicy::RegistrationOrder);
        assert!(config.broker.anonymous_relay);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 5672,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 5672);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 5673

            [broker]
            dispatch_policy = "round-robin"
            anonymous_relay = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5673);
        assert_eq!(config.broker.dispatch_policy, DispatchPolicy::RoundRobin);
        assert_eq!(config.bridge.path, "/bridge");

        let broker = config.broker_config();
        assert!(broker.offered_capabilities.is_empty());
        assert_eq!(broker.router.dispatch_policy, DispatchPolicy::RoundRobin);
    }

    #[test]
    fn test_environment_layer() {
        let mut vars = ::config::Map::new();
        vars.insert("COURIER__PORT".to_string(), "7000".to_string());
        vars.insert(
            "COURIER__BROKER__DYNAMIC_ADDRESS_PREFIX".to_string(),
            "tmp.".to_string(),
        );

        let config = Config::from_sources(None, environment().source(Some(vars))).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.broker.dynamic_address_prefix, "tmp.");
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("courier-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[metrics]\nenabled = false\nport = 9191\n").unwrap();

        let loaded = Config::from_sources(Some(&path), environment().source(Some(::config::Map::new())));
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap();
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9191);
    }

    #[test]
    fn test_load_honors_explicit_path() {
        let path = std::env::temp_dir().join(format!("courier-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[bridge]\npath = \"/amqp\"\n").unwrap();

        std::env::set_var(CONFIG_PATH_ENV, &path);
        let loaded = Config::load();
        std::env::remove_var(CONFIG_PATH_ENV);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.unwrap().bridge.path, "/amqp");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/courier.toml").is_err());
    }
}
