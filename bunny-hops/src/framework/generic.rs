use super::{Framework, extend_rootfs, rootfs_from_includes};
use crate::config::HopsConfig;
use crate::error::HopsResult;
use crate::hops::{Platform, Rootfs, RootfsType};
use bunny_llb::State;

pub(super) const NAME: &str = "generic";

/// Fallback for frameworks without dedicated support. Accepts every rootfs
/// type, monitor and architecture, and reports the framework name it was
/// requested under.
#[derive(Debug, Clone)]
pub struct Generic {
    name: String,
    platform: Platform,
    rootfs: Rootfs,
}

impl Generic {
    pub fn new(platform: Platform, rootfs: Rootfs) -> Self {
        let name = if platform.framework.is_empty() {
            NAME.to_string()
        } else {
            platform.framework.clone()
        };
        Self {
            name,
            platform,
            rootfs,
        }
    }
}

impl Framework for Generic {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_rootfs_type(&self) -> RootfsType {
        RootfsType::Raw
    }

    fn supported_rootfs_types(&self) -> &'static [RootfsType] {
        &[RootfsType::Initrd, RootfsType::Raw, RootfsType::Block]
    }

    fn declared_rootfs_type(&self) -> &str {
        &self.rootfs.rootfs_type
    }

    fn supports_monitor(&self, _monitor: &str) -> bool {
        true
    }

    fn supports_arch(&self, _arch: &str) -> bool {
        true
    }

    fn create_rootfs(&self, config: &HopsConfig) -> HopsResult<State> {
        rootfs_from_includes(self, &self.rootfs, config)
    }

    fn update_rootfs(&self, config: &HopsConfig) -> HopsResult<State> {
        extend_rootfs(self, &self.rootfs, &self.platform.monitor, config)
    }

    fn build_kernel(&self, _config: &HopsConfig) -> HopsResult<State> {
        Ok(State::scratch())
    }
}
