use super::{COMMON_ARCHS, Framework, extend_rootfs, rootfs_from_includes};
use crate::config::HopsConfig;
use crate::error::HopsResult;
use crate::hops::{Platform, Rootfs, RootfsType};
use bunny_llb::State;

pub(super) const NAME: &str = "unikraft";

const MONITORS: &[&str] = &["qemu", "firecracker"];

#[derive(Debug, Clone)]
pub struct Unikraft {
    platform: Platform,
    rootfs: Rootfs,
}

impl Unikraft {
    pub fn new(platform: Platform, rootfs: Rootfs) -> Self {
        Self { platform, rootfs }
    }
}

impl Framework for Unikraft {
    fn name(&self) -> &str {
        NAME
    }

    fn default_rootfs_type(&self) -> RootfsType {
        RootfsType::Initrd
    }

    fn supported_rootfs_types(&self) -> &'static [RootfsType] {
        &[RootfsType::Initrd, RootfsType::Raw]
    }

    fn declared_rootfs_type(&self) -> &str {
        &self.rootfs.rootfs_type
    }

    fn supports_monitor(&self, monitor: &str) -> bool {
        MONITORS.contains(&monitor)
    }

    fn supports_arch(&self, arch: &str) -> bool {
        COMMON_ARCHS.contains(&arch)
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
