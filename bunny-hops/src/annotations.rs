//! Annotations read by the urunc runtime.

use crate::error::{HopsError, HopsResult};
use crate::hops::Platform;
use std::collections::BTreeMap;

pub const ANNOTATION_PREFIX: &str = "com.urunc.unikernel.";
pub const UNIKERNEL_TYPE: &str = "com.urunc.unikernel.unikernelType";
pub const UNIKERNEL_VERSION: &str = "com.urunc.unikernel.unikernelVersion";
pub const HYPERVISOR: &str = "com.urunc.unikernel.hypervisor";
pub const CMDLINE: &str = "com.urunc.unikernel.cmdline";
pub const BINARY: &str = "com.urunc.unikernel.binary";
pub const INITRD: &str = "com.urunc.unikernel.initrd";
pub const BLOCK: &str = "com.urunc.unikernel.block";
pub const BLOCK_MOUNT_POINT: &str = "com.urunc.unikernel.blkMntPoint";
pub const MOUNT_ROOTFS: &str = "com.urunc.unikernel.mountRootfs";

/// Build the annotation map of a planned image.
///
/// `rootfs_type` is the effective type, or empty when the request has no
/// rootfs at all. Initrd and block keys are only written when there is a
/// rootfs file to point at.
///
/// # Errors
///
/// Returns an invariant error for a rootfs type outside the closed set.
pub fn build_annotations(
    platform: &Platform,
    cmd: &[String],
    kernel_path: &str,
    rootfs_path: &str,
    rootfs_type: &str,
) -> HopsResult<BTreeMap<String, String>> {
    let mut annotations = BTreeMap::new();
    annotations.insert(UNIKERNEL_TYPE.to_string(), platform.framework.clone());
    annotations.insert(HYPERVISOR.to_string(), platform.monitor.clone());
    annotations.insert(CMDLINE.to_string(), cmd.join(" "));
    annotations.insert(BINARY.to_string(), kernel_path.to_string());
    annotations.insert(MOUNT_ROOTFS.to_string(), "false".to_string());
    if !platform.version.is_empty() {
        annotations.insert(UNIKERNEL_VERSION.to_string(), platform.version.clone());
    }

    match rootfs_type {
        "" => {}
        "initrd" => {
            if !rootfs_path.is_empty() {
                annotations.insert(INITRD.to_string(), rootfs_path.to_string());
            }
        }
        "block" => {
            if !rootfs_path.is_empty() {
                annotations.insert(BLOCK.to_string(), rootfs_path.to_string());
                annotations.insert(BLOCK_MOUNT_POINT.to_string(), "/".to_string());
            }
        }
        "raw" => {
            annotations.insert(MOUNT_ROOTFS.to_string(), "true".to_string());
        }
        other => {
            return Err(HopsError::Invariant(format!(
                "Unexpected RootfsType value: {other}"
            )));
        }
    }
    Ok(annotations)
}
