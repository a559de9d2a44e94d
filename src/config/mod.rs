// ABOUTME: Configuration types and parsing for switchyard.yml.
// ABOUTME: Handles YAML parsing, defaults, discovery and validation.

mod deserialize;
mod environment;
mod health;

pub use environment::{ColorUrls, EnvironmentConfig};
pub use health::HealthConfig;

use crate::deploy::TrafficRamp;
use crate::error::{Error, Result};
use crate::types::{Color, EnvironmentName, ImageRef};
use crate::workload::RuntimeType;
use deserialize::deserialize_environments;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "switchyard.yml";
pub const CONFIG_FILENAME_ALT: &str = "switchyard.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".switchyard/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Image repository; each release is this repository tagged with its version.
    pub image: ImageRef,

    #[serde(deserialize_with = "deserialize_environments")]
    pub environments: BTreeMap<EnvironmentName, EnvironmentConfig>,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub rollout: RolloutConfig,

    #[serde(default)]
    pub ramp: TrafficRamp,

    #[serde(default)]
    pub traffic: TrafficConfig,

    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Directory for deployment state files.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolloutConfig {
    /// Upper bound for the candidate's rolling update.
    #[serde(default = "default_rollout_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Upper bound for every other collaborator call.
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,

    /// How often the traffic split is read back during a validation hold.
    #[serde(default = "default_readback_interval", with = "humantime_serde")]
    pub readback_interval: Duration,

    /// Extra attempts for the traffic revert during rollback.
    #[serde(default = "default_rollback_retries")]
    pub rollback_retries: u32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            timeout: default_rollout_timeout(),
            call_timeout: default_call_timeout(),
            readback_interval: default_readback_interval(),
            rollback_retries: default_rollback_retries(),
        }
    }
}

fn default_rollout_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_readback_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_rollback_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrafficConfig {
    /// Admin endpoint of the routing layer, e.g. `http://router.internal:9000`.
    #[serde(default)]
    pub admin_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    /// Explicit runtime type (overrides auto-detection).
    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    /// Explicit socket path (overrides default).
    #[serde(default)]
    pub socket: Option<String>,

    /// Network the workload containers join.
    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            runtime: None,
            socket: None,
            network: None,
            env: HashMap::new(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Check cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.health.success_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidConfig(format!(
                "health.success_threshold must be between 0 and 1, got {threshold}"
            )));
        }

        for (name, env) in &self.environments {
            env.validate(name.as_str()).map_err(Error::InvalidConfig)?;
        }

        if let Some(ref url) = self.traffic.admin_url
            && !url.starts_with("http://")
        {
            return Err(Error::InvalidConfig(format!(
                "traffic.admin_url must start with http:// (got {url:?})"
            )));
        }

        Ok(())
    }

    pub fn environment(&self, name: &EnvironmentName) -> Option<&EnvironmentConfig> {
        self.environments.get(name)
    }

    /// Directory holding deployment state files.
    /// Falls back to `$HOME/.local/state/switchyard`.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
            PathBuf::from(home).join(".local/state/switchyard")
        })
    }

    pub fn template() -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            EnvironmentName::new("production").expect("template environment name is valid"),
            EnvironmentConfig {
                replicas: 2,
                base_urls: ColorUrls {
                    blue: "http://my-app-blue.internal:8080".to_string(),
                    green: "http://my-app-green.internal:8080".to_string(),
                },
                active: Color::Blue,
            },
        );

        Config {
            image: ImageRef::parse("registry.example.com/my-app")
                .expect("template image reference is valid"),
            environments,
            health: HealthConfig::default(),
            rollout: RolloutConfig::default(),
            ramp: TrafficRamp::default(),
            traffic: TrafficConfig {
                admin_url: Some("http://router.internal:9000".to_string()),
            },
            workload: WorkloadConfig::default(),
            state_dir: None,
        }
    }
}

pub fn init_config(dir: &Path, image: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(i) = image {
        config.image = ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let mut environments = String::new();
    for (name, env) in &config.environments {
        environments.push_str(&format!(
            "  {}:\n    replicas: {}\n    active: {}\n    base_urls:\n      blue: {}\n      green: {}\n",
            name, env.replicas, env.active, env.base_urls.blue, env.base_urls.green
        ));
    }

    format!(
        r#"image: {image}
environments:
{environments}health:
  endpoints:
    - /health
  timeout: 30s
  retries: 3
  success_threshold: 0.95
rollout:
  timeout: 10m
traffic:
  admin_url: {admin}
ramp:
  - {{ percent: 10, step_duration: 5m, validation_duration: 2m }}
  - {{ percent: 25, step_duration: 5m, validation_duration: 2m }}
  - {{ percent: 50, step_duration: 5m, validation_duration: 2m }}
  - {{ percent: 75, step_duration: 5m, validation_duration: 2m }}
  - {{ percent: 90, step_duration: 5m, validation_duration: 2m }}
  - {{ percent: 100, step_duration: 5m, validation_duration: 2m }}
"#,
        image = config.image,
        environments = environments,
        admin = config.traffic.admin_url.as_deref().unwrap_or("http://router.internal:9000"),
    )
}
