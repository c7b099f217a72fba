//! Unikernel framework capabilities.
//!
//! Each framework declares which rootfs types, monitors and architectures it
//! supports and knows how to produce a rootfs (and, for some, a kernel) as an
//! operation graph. [`select`] picks the implementation for a request and
//! falls back to [`Generic`], which accepts everything.

mod generic;
mod mirage;
mod rumprun;
mod unikraft;

pub use generic::Generic;
pub use mirage::Mirage;
pub use rumprun::Rumprun;
pub use unikraft::Unikraft;

use crate::builder::{base_llb, files_llb, initrd_llb};
use crate::config::HopsConfig;
use crate::error::{HopsError, HopsResult};
use crate::hops::{App, Platform, Rootfs, RootfsType};
use bunny_llb::State;
use std::fmt;

/// Architectures every framework with a fixed list supports.
pub(crate) const COMMON_ARCHS: &[&str] = &["x86_64", "amd64", "aarch64", "arm64"];

/// Capability object for one unikernel framework.
pub trait Framework: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Rootfs type used when the request leaves it empty.
    fn default_rootfs_type(&self) -> RootfsType;

    fn supported_rootfs_types(&self) -> &'static [RootfsType];

    /// The `type` field of the request, possibly empty.
    fn declared_rootfs_type(&self) -> &str;

    fn supports_monitor(&self, monitor: &str) -> bool;

    fn supports_arch(&self, arch: &str) -> bool;

    /// Build a rootfs state from the request's include list.
    ///
    /// # Errors
    ///
    /// Fails with a capability error when the framework cannot build its
    /// effective rootfs type.
    fn create_rootfs(&self, config: &HopsConfig) -> HopsResult<State>;

    /// Append the include list onto the remote rootfs of the request.
    ///
    /// # Errors
    ///
    /// Fails with a capability error when the effective rootfs type cannot
    /// be extended.
    fn update_rootfs(&self, config: &HopsConfig) -> HopsResult<State>;

    /// Compile the kernel from the request's application sources.
    /// Frameworks without a toolchain return the empty state.
    ///
    /// # Errors
    ///
    /// Fails when the toolchain pipeline cannot be assembled.
    fn build_kernel(&self, config: &HopsConfig) -> HopsResult<State>;

    /// Effective rootfs type: the declared one, or the default.
    ///
    /// # Errors
    ///
    /// Returns an invariant error if the declared type is outside the
    /// closed set; callers check support before asking.
    fn rootfs_type(&self) -> HopsResult<RootfsType> {
        let declared = self.declared_rootfs_type();
        if declared.is_empty() {
            return Ok(self.default_rootfs_type());
        }
        RootfsType::parse(declared)
            .ok_or_else(|| HopsError::Invariant(format!("Unexpected RootfsType value: {declared}")))
    }

    fn supports_rootfs_type(&self, rootfs_type: &str) -> bool {
        RootfsType::parse(rootfs_type)
            .is_some_and(|parsed| self.supported_rootfs_types().contains(&parsed))
    }
}

/// Pick the framework named by `platform.framework`.
#[must_use]
pub fn select(platform: &Platform, rootfs: &Rootfs, app: Option<&App>) -> Box<dyn Framework> {
    let app = app.cloned();
    match platform.framework.as_str() {
        unikraft::NAME => Box::new(Unikraft::new(platform.clone(), rootfs.clone())),
        rumprun::NAME => Box::new(Rumprun::new(platform.clone(), rootfs.clone(), app)),
        mirage::NAME => Box::new(Mirage::new(platform.clone(), rootfs.clone(), app)),
        _ => Box::new(Generic::new(platform.clone(), rootfs.clone())),
    }
}

/// Initrd or raw rootfs built from the include list on top of scratch.
pub(crate) fn rootfs_from_includes(
    framework: &dyn Framework,
    rootfs: &Rootfs,
    config: &HopsConfig,
) -> HopsResult<State> {
    let local = State::local(config.build_context.as_str());
    match framework.rootfs_type()? {
        RootfsType::Initrd => {
            let content = files_llb(&rootfs.includes, &local, &State::scratch(), None)?;
            initrd_llb(&content, config)
        }
        RootfsType::Raw => files_llb(&rootfs.includes, &local, &State::scratch(), None),
        other => Err(HopsError::Capability(format!(
            "Cannot build {other} rootfs for {}",
            framework.name()
        ))),
    }
}

/// Raw rootfs: the include list copied onto the remote image.
pub(crate) fn extend_rootfs(
    framework: &dyn Framework,
    rootfs: &Rootfs,
    monitor: &str,
    config: &HopsConfig,
) -> HopsResult<State> {
    match framework.rootfs_type()? {
        RootfsType::Raw => {
            let base = base_llb(&rootfs.from, monitor, config);
            let local = State::local(config.build_context.as_str());
            files_llb(&rootfs.includes, &local, &base, None)
        }
        other => Err(HopsError::Capability(format!(
            "Cannot add files to an existing {other} rootfs for {}",
            framework.name()
        ))),
    }
}

/// The app a build-from-source framework was created with.
pub(crate) fn required_app<'a>(framework: &str, app: Option<&'a App>) -> HopsResult<&'a App> {
    app.ok_or_else(|| {
        HopsError::Validation(format!(
            "Framework {framework} needs an app section to build the kernel"
        ))
    })
}
