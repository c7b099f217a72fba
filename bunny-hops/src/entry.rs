//! Resolution of kernel and rootfs declarations into source entries.

use crate::builder::base_llb;
use crate::config::HopsConfig;
use crate::error::{HopsError, HopsResult};
use crate::framework::Framework;
use crate::hops::{App, Kernel, Rootfs, RootfsType};
use bunny_llb::State;
use std::fmt;
use tracing::debug;

/// Where the content of a resolved entry lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Nothing was declared
    Empty,
    /// The local build context
    Local,
    /// A remote image, with the reference it was declared with
    Remote(String),
    /// Synthesized by a framework pipeline
    Scratch,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Empty => f.write_str("empty"),
            Origin::Local => f.write_str("local"),
            Origin::Remote(reference) => write!(f, "remote({reference})"),
            Origin::Scratch => f.write_str("scratch"),
        }
    }
}

/// A kernel or rootfs declaration after resolution.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub state: State,
    pub origin: Origin,
    /// Path of the content inside `state`; empty when the whole state is
    /// the payload
    pub file_path: String,
}

impl SourceEntry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            state: State::scratch(),
            origin: Origin::Empty,
            file_path: String::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origin == Origin::Empty
    }
}

/// Resolve the kernel declaration.
///
/// An empty `from` with application sources asks the framework to build
/// the kernel; the artifact then sits at the canonical kernel path of the
/// produced state. A framework that cannot build kernels yields an empty
/// entry, which planning rejects.
///
/// # Errors
///
/// Propagates failures of the framework's kernel pipeline.
pub fn resolve_kernel(
    kernel: &Kernel,
    app: Option<&App>,
    framework: &dyn Framework,
    monitor: &str,
    config: &HopsConfig,
) -> HopsResult<SourceEntry> {
    let entry = match kernel.from.as_str() {
        "" if app.is_some() => {
            let state = framework.build_kernel(config)?;
            // frameworks without a toolchain hand back scratch: nothing was built
            if state.is_scratch() {
                SourceEntry::empty()
            } else {
                SourceEntry {
                    state,
                    origin: Origin::Scratch,
                    file_path: config.kernel_path.clone(),
                }
            }
        }
        "" => SourceEntry::empty(),
        "local" => SourceEntry {
            state: State::local(config.build_context.as_str()),
            origin: Origin::Local,
            file_path: kernel.path.clone(),
        },
        reference => SourceEntry {
            state: base_llb(reference, monitor, config),
            origin: Origin::Remote(reference.to_string()),
            file_path: kernel.path.clone(),
        },
    };
    debug!(origin = %entry.origin, path = %entry.file_path, "Resolved kernel entry");
    Ok(entry)
}

/// Resolve the rootfs declaration.
///
/// # Errors
///
/// Fails with a capability error when the declared type is not supported
/// by `framework`, and propagates failures of rootfs synthesis.
pub fn resolve_rootfs(
    rootfs: &Rootfs,
    framework: &dyn Framework,
    monitor: &str,
    config: &HopsConfig,
) -> HopsResult<SourceEntry> {
    if !rootfs.rootfs_type.is_empty() && !framework.supports_rootfs_type(&rootfs.rootfs_type) {
        return Err(HopsError::Capability(format!(
            "Framework {} does not support {} rootfs",
            framework.name(),
            rootfs.rootfs_type
        )));
    }

    let entry = if rootfs.from == "local" {
        SourceEntry {
            state: State::local(config.build_context.as_str()),
            origin: Origin::Local,
            file_path: rootfs.path.clone(),
        }
    } else if rootfs.is_scratch() {
        if rootfs.includes.is_empty() {
            SourceEntry::empty()
        } else {
            let state = framework.create_rootfs(config)?;
            let file_path = match framework.rootfs_type()? {
                RootfsType::Raw => String::new(),
                _ => config.rootfs_path.clone(),
            };
            SourceEntry {
                state,
                origin: Origin::Scratch,
                file_path,
            }
        }
    } else if !rootfs.includes.is_empty() {
        SourceEntry {
            state: framework.update_rootfs(config)?,
            origin: Origin::Remote(rootfs.from.clone()),
            file_path: String::new(),
        }
    } else {
        SourceEntry {
            state: base_llb(&rootfs.from, monitor, config),
            origin: Origin::Remote(rootfs.from.clone()),
            file_path: rootfs.path.clone(),
        }
    };
    debug!(origin = %entry.origin, path = %entry.file_path, "Resolved rootfs entry");
    Ok(entry)
}
