//! Fragnet configuration file handling
//!
//! TOML file with node, fragmentation, retrieval and logging settings.
//! Every section is optional; missing values fall back to the library
//! defaults.

use fragnet::fragment::DEFAULT_FRAGMENT_SIZE;
use fragnet::node::generate_node_id;
use fragnet::retrieval::RetrievalConfig;
use fragnet::NodeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default listen address (ephemeral port on loopback)
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:0";

/// Fragnet node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragnetConfig {
    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub fragments: FragmentsSection,

    #[serde(default)]
    pub retrieval: RetrievalSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity and listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Node id recorded in published records (random if absent)
    pub node_id: Option<String>,

    /// Address the fragment server binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Fragmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentsSection {
    /// Fragment size in bytes
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,
}

/// Retrieval timeouts, in humantime notation ("5s", "1m 30s")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: String,

    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_fragment_size() -> usize {
    DEFAULT_FRAGMENT_SIZE
}

fn default_fetch_timeout() -> String {
    humantime::format_duration(RetrievalConfig::default().fetch_timeout).to_string()
}

fn default_retrieval_timeout() -> String {
    humantime::format_duration(RetrievalConfig::default().retrieval_timeout).to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            node_id: None,
            listen_address: default_listen_address(),
        }
    }
}

impl Default for FragmentsSection {
    fn default() -> Self {
        Self {
            fragment_size: default_fragment_size(),
        }
    }
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            retrieval_timeout: default_retrieval_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl FragnetConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: FragnetConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Build validated node settings.
    ///
    /// `node_id` overrides the configured id (used by the demo to name its
    /// nodes).
    pub fn node_config(
        &self,
        node_id: Option<&str>,
    ) -> Result<NodeConfig, Box<dyn std::error::Error>> {
        let fetch_timeout = humantime::parse_duration(&self.retrieval.fetch_timeout)
            .map_err(|e| format!("Invalid retrieval.fetch_timeout: {}", e))?;
        let retrieval_timeout = humantime::parse_duration(&self.retrieval.retrieval_timeout)
            .map_err(|e| format!("Invalid retrieval.retrieval_timeout: {}", e))?;

        let node_id = node_id
            .map(str::to_string)
            .or_else(|| self.node.node_id.clone())
            .unwrap_or_else(generate_node_id);

        let config = NodeConfig {
            node_id,
            listen_address: self.node.listen_address.clone(),
            fragment_size: self.fragments.fragment_size,
            retrieval: RetrievalConfig {
                fetch_timeout,
                retrieval_timeout,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Fragnet Node Configuration

[node]
# Node id recorded as owner in published records.
# Leave commented to generate a random id at startup.
# node_id = "node-1"

# Address the fragment server listens on (port 0 picks a free port)
listen_address = "{listen_address}"

[fragments]
# Fragment size in bytes
fragment_size = {fragment_size}

[retrieval]
# Timeout for a single fragment fetch
fetch_timeout = "{fetch_timeout}"

# Deadline for fetching all fragments of one file
retrieval_timeout = "{retrieval_timeout}"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
level = "{level}"
"#,
            listen_address = DEFAULT_LISTEN_ADDRESS,
            fragment_size = DEFAULT_FRAGMENT_SIZE,
            fetch_timeout = default_fetch_timeout(),
            retrieval_timeout = default_retrieval_timeout(),
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default config file path
///
/// - Linux: ~/.local/share/fragnet/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fragnet")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = FragnetConfig::default();

        assert_eq!(config.node.node_id, None);
        assert_eq!(config.node.listen_address, "127.0.0.1:0");
        assert_eq!(config.fragments.fragment_size, 262_144);
        assert_eq!(config.retrieval.fetch_timeout, "5s");
        assert_eq!(config.retrieval.retrieval_timeout, "1m");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_create_default_config_loads() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        FragnetConfig::create_default(&config_path).unwrap();
        assert!(config_path.exists());

        let config = FragnetConfig::load(&config_path).unwrap();
        let node = config.node_config(None).unwrap();
        assert_eq!(node.fragment_size, DEFAULT_FRAGMENT_SIZE);
        assert_eq!(node.retrieval, RetrievalConfig::default());
        assert!(node.node_id.starts_with("node-"));
    }

    #[test]
    fn test_load_partial_config_applies_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[node]
node_id = "alpha"

[retrieval]
fetch_timeout = "750ms"
"#,
        )
        .unwrap();

        let config = FragnetConfig::load(&config_path).unwrap();
        let node = config.node_config(None).unwrap();

        assert_eq!(node.node_id, "alpha");
        assert_eq!(node.listen_address, "127.0.0.1:0");
        assert_eq!(node.retrieval.fetch_timeout, Duration::from_millis(750));
        assert_eq!(node.retrieval.retrieval_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_node_id_override() {
        let mut config = FragnetConfig::default();
        config.node.node_id = Some("configured".to_string());

        let node = config.node_config(Some("demo-1")).unwrap();
        assert_eq!(node.node_id, "demo-1");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = FragnetConfig::default();
        config.retrieval.fetch_timeout = "soon".to_string();
        assert!(config.node_config(None).is_err());

        let mut config = FragnetConfig::default();
        config.fragments.fragment_size = 0;
        assert!(config.node_config(None).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = FragnetConfig::load_or_default(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("fragnet/config.toml"));
    }
}
