//! Function descriptors (spec §3, §6.2 "functions file")

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Scaling bounds for one function. Invariant: `min_capacity <= max_capacity`
/// (spec §3), checked in [`FunctionsFile::load`].
#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    pub max_capacity: u32,
    #[serde(default)]
    pub min_capacity: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout: u64,
}

fn default_acquire_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionEntry {
    pub image: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub scaling: ScalingConfig,
    pub idle_timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FunctionDefaults {
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFunctionsFile {
    #[serde(default)]
    defaults: FunctionDefaults,
    functions: HashMap<String, FunctionEntry>,
}

/// Immutable-after-load descriptor for one function (spec §3 "Function
/// descriptor"). `environment` is already merged: defaults beneath
/// per-function overrides.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub image: String,
    pub environment: HashMap<String, String>,
    pub max_capacity: u32,
    pub min_capacity: u32,
    pub acquire_timeout: std::time::Duration,
    pub idle_timeout: Option<std::time::Duration>,
}

pub struct FunctionsFile {
    functions: HashMap<String, FunctionDescriptor>,
}

impl FunctionsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read functions file: {}", path.display()))?;
        let raw: RawFunctionsFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse functions file: {}", path.display()))?;

        let mut functions = HashMap::new();
        for (name, entry) in raw.functions {
            if entry.scaling.min_capacity > entry.scaling.max_capacity {
                anyhow::bail!(
                    "function {name}: min_capacity ({}) exceeds max_capacity ({})",
                    entry.scaling.min_capacity,
                    entry.scaling.max_capacity
                );
            }

            let mut environment = raw.defaults.environment.clone();
            environment.extend(entry.environment);

            functions.insert(
                name.clone(),
                FunctionDescriptor {
                    name,
                    image: entry.image,
                    environment,
                    max_capacity: entry.scaling.max_capacity,
                    min_capacity: entry.scaling.min_capacity,
                    acquire_timeout: std::time::Duration::from_secs(entry.scaling.acquire_timeout),
                    idle_timeout: entry.idle_timeout.map(std::time::Duration::from_secs),
                },
            );
        }

        Ok(Self { functions })
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn merges_defaults_beneath_per_function_environment() {
        let f = write_temp(
            r#"
defaults:
  environment:
    LOG_LEVEL: info
    REGION: local
functions:
  echo:
    image: faasd/echo:latest
    environment:
      REGION: override
    scaling:
      max_capacity: 3
"#,
        );
        let file = FunctionsFile::load(f.path()).unwrap();
        let desc = file.get("echo").unwrap();
        assert_eq!(desc.environment.get("LOG_LEVEL").unwrap(), "info");
        assert_eq!(desc.environment.get("REGION").unwrap(), "override");
    }

    #[test]
    fn rejects_min_capacity_above_max() {
        let f = write_temp(
            r#"
functions:
  broken:
    image: x
    scaling:
      max_capacity: 1
      min_capacity: 5
"#,
        );
        assert!(FunctionsFile::load(f.path()).is_err());
    }
}
