//! Graph-builder primitives.
//!
//! Every function here is a pure function of its arguments: calling it twice
//! with the same inputs yields structurally identical graphs, which the
//! execution engine relies on to deduplicate work.

use crate::config::HopsConfig;
use crate::error::{HopsError, HopsResult};
use crate::plan::PackCopy;
use bunny_llb::{CopyOptions, ExecBuilder, MountOptions, Platform, SourceOptions, State};
use tracing::debug;

/// One parsed `src[:dst]` include entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub src: String,
    pub dst: String,
}

impl Include {
    /// Parse `src[:dst]`; the destination defaults to the source path.
    ///
    /// # Errors
    ///
    /// Returns a resolution error for an empty source or more than one `:`.
    pub fn parse(entry: &str) -> HopsResult<Self> {
        let parts: Vec<&str> = entry.split(':').collect();
        match parts.as_slice() {
            [src] | [src, ""] if !src.is_empty() => Ok(Self {
                src: (*src).to_string(),
                dst: (*src).to_string(),
            }),
            [src, dst] if !src.is_empty() => Ok(Self {
                src: (*src).to_string(),
                dst: (*dst).to_string(),
            }),
            _ => Err(HopsError::Resolution(format!(
                "Invalid format of the file list to copy: {entry:?}"
            ))),
        }
    }
}

/// Copy every include entry out of `from` onto `to`, each copy building on
/// the previous one.
///
/// # Errors
///
/// Returns a resolution error for a malformed entry.
pub fn files_llb(
    includes: &[String],
    from: &State,
    to: &State,
    owner: Option<u32>,
) -> HopsResult<State> {
    let mut state = to.clone();
    for entry in includes {
        let include = Include::parse(entry)?;
        state = state.copy_with(
            from,
            &include.src,
            &include.dst,
            CopyOptions {
                create_dest_path: true,
                owner,
            },
        );
    }
    Ok(state)
}

/// Apply one planned copy onto `to`.
#[must_use]
pub fn copy_llb(to: &State, copy: &PackCopy) -> State {
    to.copy(&copy.state, &copy.src, &copy.dst)
}

/// Pack the content of `content` into a newc cpio archive.
///
/// The result is an otherwise empty state holding the archive at the
/// canonical rootfs path.
///
/// # Errors
///
/// Fails only if the artifact mount cannot be found, which would be a bug.
pub fn initrd_llb(content: &State, config: &HopsConfig) -> HopsResult<State> {
    let toolset = State::image_with(
        config.archive_image.as_str(),
        SourceOptions {
            platform: None,
            custom_name: Some("Internal:Create initrd".to_string()),
        },
    )
    .mkdir("/tmp", 0o755);

    let archive = format!(
        "find . -depth -print | tac | bsdcpio -o --format newc > {}",
        config.rootfs_path
    );
    let exec = toolset
        .dir(&config.work_dir)
        .run(["sh", "-c", archive.as_str()])
        .mount(
            &config.work_dir,
            content,
            MountOptions {
                readonly: true,
                selector: None,
            },
        );

    artifacts(exec, &config.output_dir)
}

/// Finish `exec` with a fresh `out_dir` mount and return what the command
/// left in it.
///
/// # Errors
///
/// Fails only if the artifact mount cannot be found, which would be a bug.
pub fn artifacts(exec: ExecBuilder, out_dir: &str) -> HopsResult<State> {
    let target = State::scratch().mkdir(out_dir, 0o755);
    let exec = exec
        .mount(
            out_dir,
            &target,
            MountOptions {
                readonly: false,
                selector: Some(out_dir.to_string()),
            },
        )
        .build();
    exec.mount_output(out_dir)
        .map_err(|e| HopsError::Invariant(format!("Missing artifact mount {out_dir}: {e}")))
}

/// Map a symbolic base reference to a source state.
///
/// `scratch` (or nothing) is the empty filesystem. Builder-hub images are
/// published per monitor, so they are pulled for `<monitor>/<host arch>`.
#[must_use]
pub fn base_llb(reference: &str, monitor: &str, config: &HopsConfig) -> State {
    if reference.is_empty() || reference == "scratch" {
        return State::scratch();
    }
    if config.is_builder_hub(reference) {
        let os = if monitor == "firecracker" { "fc" } else { monitor };
        let platform = Platform::new(os, config.host_arch.as_str());
        debug!(%reference, %platform, "Pinning builder hub image");
        return State::image_with(
            reference,
            SourceOptions {
                platform: Some(platform),
                custom_name: None,
            },
        );
    }
    State::image(reference)
}
