//! Fixed paths and images used while planning.

use bunny_llb::Platform;

/// Highest input format version understood by this crate.
pub const HOPS_VERSION: &str = "v0.1";

/// Paths, images and names every planning component reads.
///
/// The defaults match what the urunc runtime expects inside the final image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopsConfig {
    /// Canonical in-image kernel path
    pub kernel_path: String,
    /// Canonical in-image rootfs path
    pub rootfs_path: String,
    /// Directory toolchain pipelines write their artifacts to
    pub output_dir: String,
    /// Directory content is mounted at inside toolchain images
    pub work_dir: String,
    /// Metadata file duplicating the annotations inside the image
    pub metadata_path: String,
    /// Name of the local build-context source
    pub build_context: String,
    pub archive_image: String,
    pub rumprun_tools_image: String,
    pub mirage_tools_image: String,
    /// Registry namespace whose images are published per monitor
    pub builder_hub: String,
    /// Host architecture in OCI naming
    pub host_arch: String,
}

impl Default for HopsConfig {
    fn default() -> Self {
        Self {
            kernel_path: "/.boot/kernel".to_string(),
            rootfs_path: "/.boot/rootfs".to_string(),
            output_dir: "/.boot".to_string(),
            work_dir: "/workdir".to_string(),
            metadata_path: "/urunc.json".to_string(),
            build_context: "context".to_string(),
            archive_image: "harbor.nbfc.io/nubificus/bunny/libarchive:latest".to_string(),
            rumprun_tools_image: "harbor.nbfc.io/nubificus/bunny/rumprun/tools:latest".to_string(),
            mirage_tools_image: "harbor.nbfc.io/nubificus/bunny/mirage/tools:latest".to_string(),
            builder_hub: "unikraft.org".to_string(),
            host_arch: Platform::host_architecture().to_string(),
        }
    }
}

impl HopsConfig {
    /// Platform the final image is produced for.
    #[must_use]
    pub fn target_platform(&self) -> Platform {
        Platform::linux(self.host_arch.as_str())
    }

    /// Whether images under `reference` are published per monitor.
    #[must_use]
    pub fn is_builder_hub(&self, reference: &str) -> bool {
        reference.starts_with(&self.builder_hub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HopsConfig::default();
        assert_eq!(config.kernel_path, "/.boot/kernel");
        assert_eq!(config.rootfs_path, "/.boot/rootfs");
        assert_eq!(config.metadata_path, "/urunc.json");
        assert!(config.rootfs_path.starts_with(&config.output_dir));
        assert_eq!(config.target_platform().os, "linux");
    }

    #[test]
    fn test_builder_hub() {
        let config = HopsConfig::default();
        assert!(config.is_builder_hub("unikraft.org/nginx:1.15"));
        assert!(!config.is_builder_hub("harbor.nbfc.io/unikraft.org"));
    }
}
