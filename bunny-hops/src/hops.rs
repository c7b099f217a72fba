//! Declarative packaging request ("bunnyfile") data model.

use crate::error::{HopsError, HopsResult};
use crate::validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Target framework and monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub framework: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub monitor: String,
    #[serde(default, alias = "arch", skip_serializing_if = "String::is_empty")]
    pub architecture: String,
}

/// Root filesystem declaration.
///
/// `from` is empty, `scratch`, `local` or an image reference. Empty and
/// `scratch` both mean "build one from `includes`, if any".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rootfs {
    #[serde(default = "default_rootfs_from")]
    pub from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub rootfs_type: String,
    #[serde(rename = "include", default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
}

impl Default for Rootfs {
    fn default() -> Self {
        Self {
            from: default_rootfs_from(),
            path: String::new(),
            rootfs_type: String::new(),
            includes: Vec::new(),
        }
    }
}

impl Rootfs {
    /// Whether the rootfs has no external source.
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.from.is_empty() || self.from == "scratch"
    }
}

fn default_rootfs_from() -> String {
    "scratch".to_string()
}

/// Prebuilt kernel declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub path: String,
}

/// Application sources for frameworks that build the kernel themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
}

/// A complete packaging request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hops {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "platforms", default)]
    pub platform: Platform,
    #[serde(default)]
    pub rootfs: Rootfs,
    #[serde(default)]
    pub kernel: Kernel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    /// Legacy space-separated command line, ignored when `cmd` is set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmdline: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
}

impl Hops {
    /// Decode a bunnyfile without validating it.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the YAML does not match the format.
    pub fn from_yaml(bytes: &[u8]) -> HopsResult<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Decode and validate a bunnyfile.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed or contradictory input.
    pub fn parse(bytes: &[u8]) -> HopsResult<Self> {
        let hops = Self::from_yaml(bytes)?;
        validate::validate(&hops)?;
        debug!(
            framework = %hops.platform.framework,
            monitor = %hops.platform.monitor,
            "Parsed bunnyfile"
        );
        Ok(hops)
    }

    /// Read, decode and validate a bunnyfile from disk.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the file cannot be read or is invalid.
    pub async fn load(path: &Path) -> HopsResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            HopsError::Validation(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&bytes)
    }

    /// Command line of the unikernel. The list form wins over the legacy
    /// string.
    #[must_use]
    pub fn command(&self) -> Vec<String> {
        if self.cmd.is_empty() {
            self.cmdline.split_whitespace().map(str::to_string).collect()
        } else {
            self.cmd.clone()
        }
    }
}

/// Closed set of rootfs representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootfsType {
    /// A single cpio archive loaded by the kernel
    Initrd,
    /// The whole filesystem of a state, mounted by the runtime
    Raw,
    /// A block device image
    Block,
}

impl RootfsType {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initrd" => Some(RootfsType::Initrd),
            "raw" => Some(RootfsType::Raw),
            "block" => Some(RootfsType::Block),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RootfsType::Initrd => "initrd",
            RootfsType::Raw => "raw",
            RootfsType::Block => "block",
        }
    }
}

impl fmt::Display for RootfsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
