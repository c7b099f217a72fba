//! OCI image configuration of the produced image.
//!
//! The configuration starts from the base image's own config, so that
//! whatever the upstream image declares survives, and is then rewritten to
//! describe a `linux` image carrying the unikernel annotations as labels.

use crate::config::HopsConfig;
use crate::error::{HopsError, HopsResult};
use crate::plan::PackConfig;
use bunny_llb::{Platform, normalize_image_reference};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use tracing::debug;

/// Error type produced by external collaborators.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Subset of the OCI image configuration that planning reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub rootfs: RootFs,
}

/// Runtime defaults of a container started from the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type", default)]
    pub fs_type: String,
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

/// Looks up the configuration blob of a remote image.
pub trait ImageMetadataResolver {
    /// Raw JSON config of `reference` for `platform`.
    ///
    /// # Errors
    ///
    /// Any failure of the lookup, reported as is.
    fn resolve_image_config(&self, reference: &str, platform: &Platform)
    -> Result<Vec<u8>, BoxError>;
}

/// Fetch the config of the image a plan starts from.
///
/// Empty and `scratch` references have no config. Builder-hub images are
/// looked up for the monitor as OS, everything else for `linux`.
///
/// # Errors
///
/// Fails when the reference cannot be parsed, the lookup fails, or the
/// returned blob is not an image config.
pub fn base_image_config<R: ImageMetadataResolver + ?Sized>(
    resolver: &R,
    base_ref: &str,
    monitor: &str,
    config: &HopsConfig,
) -> HopsResult<ImageConfig> {
    if base_ref.is_empty() || base_ref == "scratch" {
        return Ok(ImageConfig::default());
    }
    let name = normalize_image_reference(base_ref).map_err(|e| {
        HopsError::Resolution(format!("Failed to parse image name {base_ref}: {e}"))
    })?;
    let os = if config.is_builder_hub(base_ref) { monitor } else { "linux" };
    let platform = Platform::new(os, config.host_arch.as_str());
    debug!(image = %name, %platform, "Resolving image metadata");

    let blob = resolver.resolve_image_config(&name, &platform).map_err(|e| {
        HopsError::Materialization(format!("Failed to get image config from {name}: {e}"))
    })?;
    serde_json::from_slice(&blob).map_err(|e| {
        HopsError::Materialization(format!("Failed to unmarshal image config of {name}: {e}"))
    })
}

impl ImageConfig {
    /// Rewrite the config for the planned image.
    pub fn apply_plan(
        &mut self,
        pack: &PackConfig,
        annotations: &BTreeMap<String, String>,
        config: &HopsConfig,
    ) {
        self.os = "linux".to_string();
        self.architecture = config.host_arch.clone();
        self.rootfs = RootFs {
            fs_type: "layers".to_string(),
            diff_ids: Vec::new(),
        };
        self.config.cmd = pack.cmd.clone();
        self.config.entrypoint = pack.entrypoint.clone();
        self.config.env.extend(pack.env.iter().cloned());
        self.config
            .labels
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}
