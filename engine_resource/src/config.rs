//! Configuration.
//!
//! Loads resource runtime configuration from JSON strings/files (file IO left
//! to the host).

use serde::{Deserialize, Serialize};

/// Settings for the resource cache and boot sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Root of compiled resources; files live under `<build_dir>/<platform>/`.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    /// Platform subdirectory of `build_dir`.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Package loaded at boot.
    #[serde(default = "default_boot_package")]
    pub boot_package: String,
    /// Unit spawned into world 0 after the boot package is flushed.
    #[serde(default)]
    pub boot_unit: Option<String>,
    /// Load missing resources on first access instead of failing.
    #[serde(default)]
    pub autoload: bool,
}

fn default_build_dir() -> String {
    "data/build".to_string()
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_boot_package() -> String {
    "boot".to_string()
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            platform: default_platform(),
            boot_package: default_boot_package(),
            boot_unit: None,
            autoload: false,
        }
    }
}

impl ResourceConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = ResourceConfig::from_json_str(r#"{"boot_unit": "level1"}"#).unwrap();
        assert_eq!(cfg.build_dir, "data/build");
        assert_eq!(cfg.boot_package, "boot");
        assert_eq!(cfg.boot_unit.as_deref(), Some("level1"));
        assert!(!cfg.autoload);
        assert_eq!(cfg, ResourceConfig { boot_unit: Some("level1".into()), ..Default::default() });
    }
}
