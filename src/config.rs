use crate::environment::EnvironmentMode;
use crate::stack::RetentionDays;
use crate::stack::network::{DEFAULT_CIDR, Ipv4Cidr};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "stack.toml";

// ============================================================================
// Main Config Schema
// ============================================================================

/// Everything that can vary between deployments of the stack.
///
/// Every section is optional; a missing file or section means the stack is
/// declared exactly as published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StackConfig {
    #[serde(default)]
    pub stack: StackSection,

    /// Target account/region selection
    #[serde(default)]
    pub environment: EnvironmentMode,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub task: TaskConfig,

    /// Container images
    #[serde(default)]
    pub images: ImagesConfig,

    /// Secret injected into the sidecar
    #[serde(default)]
    pub secret: SecretConfig,

    #[serde(default)]
    pub logs: LogsConfig,
}

impl StackConfig {
    /// Load from `path`, or from `./stack.toml` when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: PathBuf = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    log::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format in stack config")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.stack.validate()?;
        self.images.validate()?;
        self.secret.validate()?;
        self.logs.retention()?;
        self.network.cidr()?;

        if self.network.max_availability_zones == 0 {
            bail!("network.max_availability_zones must be at least 1");
        }
        if self.task.memory_limit_mib == 0 || self.task.cpu_units == 0 {
            bail!("task.memory_limit_mib and task.cpu_units must be positive");
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSection {
    #[serde(default = "default_stack_name")]
    pub name: String,
}

fn default_stack_name() -> String {
    "InigoStarwarsExample".to_string()
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
        }
    }
}

impl StackSection {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("stack.name cannot be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_max_azs")]
    pub max_availability_zones: u8,
    #[serde(default = "default_cidr")]
    pub cidr: String,
}

fn default_max_azs() -> u8 {
    2
}

fn default_cidr() -> String {
    DEFAULT_CIDR.to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_availability_zones: default_max_azs(),
            cidr: default_cidr(),
        }
    }
}

impl NetworkConfig {
    pub fn cidr(&self) -> Result<Ipv4Cidr> {
        self.cidr.parse().context("Invalid network.cidr")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_memory")]
    pub memory_limit_mib: u32,
    #[serde(default = "default_cpu")]
    pub cpu_units: u32,
}

fn default_memory() -> u32 {
    512
}

fn default_cpu() -> u32 {
    256
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            memory_limit_mib: default_memory(),
            cpu_units: default_cpu(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_starwars_image")]
    pub starwars: String,
    #[serde(default = "default_sidecar_image")]
    pub sidecar: String,
}

fn default_starwars_image() -> String {
    "inigohub/starwars:latest".to_string()
}

fn default_sidecar_image() -> String {
    "inigohub/sidecar:latest".to_string()
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            starwars: default_starwars_image(),
            sidecar: default_sidecar_image(),
        }
    }
}

impl ImagesConfig {
    fn validate(&self) -> Result<()> {
        for (key, image) in [("starwars", &self.starwars), ("sidecar", &self.sidecar)] {
            if image.trim().is_empty() {
                bail!("images.{key} cannot be empty");
            }
            if image.chars().any(char::is_whitespace) {
                bail!("images.{key} '{image}' contains whitespace");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default = "default_secret_name")]
    pub name: String,
    #[serde(default = "default_secret_field")]
    pub field: String,
}

fn default_secret_name() -> String {
    "InigoServiceToken".to_string()
}

fn default_secret_field() -> String {
    "SERVICE_TOKEN".to_string()
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            name: default_secret_name(),
            field: default_secret_field(),
        }
    }
}

impl SecretConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("secret.name cannot be empty");
        }
        if self.field.trim().is_empty() {
            bail!("secret.field cannot be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsConfig {
    /// One of the periods CloudWatch accepts, or 0 to never expire
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    1
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

impl LogsConfig {
    pub fn retention(&self) -> Result<RetentionDays> {
        RetentionDays::from_days(self.retention_days).context("Invalid logs.retention_days")
    }
}

// ============================================================================
// Tests
// ============================================================================
