//! Base selection and copy planning.
//!
//! Given the resolved kernel and rootfs entries, decide which state the
//! final image starts from and which files have to be copied into it. A
//! remote or synthesized entry is reused as the base when it can be, so the
//! upstream image keeps its configuration and nothing is copied twice.
//! Copied content always lands on the canonical paths of [`HopsConfig`].

use crate::config::HopsConfig;
use crate::entry::{Origin, SourceEntry};
use crate::error::{HopsError, HopsResult};
use crate::plan::PackCopy;
use bunny_llb::State;
use tracing::debug;

/// Outcome of base selection.
#[derive(Debug, Clone)]
pub struct BaseSelection {
    pub base: State,
    /// Reference the base was pulled from, `scratch` otherwise
    pub base_ref: String,
    pub copies: Vec<PackCopy>,
    /// Kernel location inside the final image
    pub kernel_path: String,
    /// Rootfs location inside the final image, empty without a rootfs file
    pub rootfs_path: String,
}

impl BaseSelection {
    fn set_base(&mut self, entry: &SourceEntry) {
        self.base = entry.state.clone();
        self.base_ref = match &entry.origin {
            Origin::Remote(reference) => reference.clone(),
            _ => "scratch".to_string(),
        };
    }

    fn push_copy(&mut self, entry: &SourceEntry, dst: &str) {
        self.copies.push(PackCopy {
            state: entry.state.clone(),
            src: entry.file_path.clone(),
            dst: dst.to_string(),
        });
    }
}

/// Choose the base state and the copies for one request.
///
/// # Errors
///
/// Returns a validation error when the kernel entry is empty.
pub fn set_base_and_get_paths(
    kernel: &SourceEntry,
    rootfs: &SourceEntry,
    config: &HopsConfig,
) -> HopsResult<BaseSelection> {
    let mut selection = BaseSelection {
        base: State::scratch(),
        base_ref: "scratch".to_string(),
        copies: Vec::new(),
        kernel_path: String::new(),
        rootfs_path: String::new(),
    };

    let mut kernel_copied = false;
    match &kernel.origin {
        Origin::Empty => {
            return Err(HopsError::Validation(
                "kernel source must not be empty".to_string(),
            ));
        }
        Origin::Local => {
            selection.push_copy(kernel, &config.kernel_path);
            selection.kernel_path = config.kernel_path.clone();
            kernel_copied = true;
        }
        Origin::Remote(_) | Origin::Scratch => {
            selection.set_base(kernel);
            selection.kernel_path = kernel.file_path.clone();
        }
    }

    let mut rootfs_copied = false;
    match &rootfs.origin {
        Origin::Empty => {}
        Origin::Local => {
            selection.push_copy(rootfs, &config.rootfs_path);
            selection.rootfs_path = config.rootfs_path.clone();
            rootfs_copied = true;
        }
        Origin::Scratch | Origin::Remote(_) if !rootfs.file_path.is_empty() => {
            selection.push_copy(rootfs, &config.rootfs_path);
            selection.rootfs_path = config.rootfs_path.clone();
            rootfs_copied = true;
        }
        Origin::Scratch | Origin::Remote(_) => {
            selection.set_base(rootfs);
        }
    }

    // Both entries only offered themselves as a base, and the rootfs won.
    // The kernel still needs a fixed home in the image.
    if !kernel_copied && !rootfs_copied && !rootfs.is_empty() {
        selection.push_copy(kernel, &config.kernel_path);
        selection.kernel_path = config.kernel_path.clone();
    }

    debug!(
        base = %selection.base_ref,
        copies = selection.copies.len(),
        kernel = %selection.kernel_path,
        rootfs = %selection.rootfs_path,
        "Selected base"
    );
    Ok(selection)
}
