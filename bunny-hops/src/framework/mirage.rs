use super::{COMMON_ARCHS, Framework, required_app};
use crate::builder::{artifacts, files_llb};
use crate::config::HopsConfig;
use crate::error::{HopsError, HopsResult};
use crate::hops::{App, Platform, Rootfs, RootfsType};
use bunny_llb::{SourceOptions, State};
use tracing::debug;

pub(super) const NAME: &str = "mirage";

const MONITORS: &[&str] = &["qemu", "firecracker", "hvt", "spt"];
const OPAM_UID: u32 = 1000;
const OPAM_SWITCH: &str = "/home/opam/.opam/5.3";
const EXTRA_REPOS: &str = concat!(
    "opam-overlays:https://github.com/dune-universe/opam-overlays.git",
    "#395cbc4acc1f4524853728c5885f32f1cfff281b,",
    "mirage-opam-overlays:https://github.com/dune-universe/mirage-opam-overlays.git",
    "#797cb363df3ff763c43c8fbec5cd44de2878757e",
);

/// MirageOS unikernels. Rootfs content is always supplied externally; the
/// kernel is built with the opam toolchain.
#[derive(Debug, Clone)]
pub struct Mirage {
    platform: Platform,
    rootfs: Rootfs,
    app: Option<App>,
}

impl Mirage {
    pub fn new(platform: Platform, rootfs: Rootfs, app: Option<App>) -> Self {
        Self {
            platform,
            rootfs,
            app,
        }
    }

    /// `mirage configure` target for the requested monitor.
    fn mode(&self) -> &str {
        match self.platform.monitor.as_str() {
            "qemu" => "virtio",
            other => other,
        }
    }
}

fn with_opam_env(state: &State, mode: &str) -> State {
    state
        .user("opam")
        .add_env(
            "CAML_LD_LIBRARY_PATH",
            &format!(
                "{OPAM_SWITCH}/lib/stublibs:\
                 {OPAM_SWITCH}/lib/ocaml/stublibs:\
                 {OPAM_SWITCH}/lib/ocaml"
            ),
        )
        .add_env("OCAML_TOPLEVEL_PATH", &format!("{OPAM_SWITCH}/lib/toplevel"))
        .add_env("OPAMYES", "1")
        .add_env("OPAMPRECISETRACKING", "1")
        .add_env("OPAMERRLOGLEN", "0")
        .add_env("OPAM_SWITCH_PREFIX", OPAM_SWITCH)
        .add_env("OPAMCONFIRMLEVEL", "unsafe-yes")
        .add_env(
            "PATH",
            &format!(
                "{OPAM_SWITCH}/bin:/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"
            ),
        )
        .add_env("MODE", mode)
}

impl Framework for Mirage {
    fn name(&self) -> &str {
        NAME
    }

    fn default_rootfs_type(&self) -> RootfsType {
        RootfsType::Block
    }

    fn supported_rootfs_types(&self) -> &'static [RootfsType] {
        &[RootfsType::Block, RootfsType::Raw]
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

    fn create_rootfs(&self, _config: &HopsConfig) -> HopsResult<State> {
        Err(HopsError::Capability(format!("Can not create rootfs for {NAME}")))
    }

    fn update_rootfs(&self, _config: &HopsConfig) -> HopsResult<State> {
        Err(HopsError::Capability(format!("Can not update rootfs for {NAME}")))
    }

    fn build_kernel(&self, config: &HopsConfig) -> HopsResult<State> {
        let app = required_app(NAME, self.app.as_ref())?;
        let content = if app.from == "local" {
            State::local(config.build_context.as_str())
        } else {
            let branch = if app.branch.is_empty() { "HEAD" } else { app.branch.as_str() };
            State::git(app.from.as_str(), branch)
        };
        let mode = self.mode();
        debug!(source = %app.from, %mode, "Building mirage kernel");

        let toolset = State::image_with(
            config.mirage_tools_image.as_str(),
            SourceOptions {
                platform: None,
                custom_name: Some("Internal:Build Mirage unikernel".to_string()),
            },
        );
        let project_dir = format!("/home/opam{}", config.work_dir);
        let workspace = files_llb(
            &[format!("/:{project_dir}")],
            &content,
            &toolset,
            Some(OPAM_UID),
        )?
        .dir(&project_dir);

        let configured = with_opam_env(&workspace, mode)
            .run(["mirage", "configure", "-t", mode])
            .build()
            .root();

        let mut prepared =
            with_opam_env(&configured, mode).add_env("MIRAGE_EXTRA_REPOS", EXTRA_REPOS);
        for target in ["lock", "depends", "pull"] {
            prepared = prepared.run(["make", target]).build().root();
        }

        let built = with_opam_env(&prepared, mode)
            .add_env("DUNE_CACHE", "enabled")
            .add_env("DUNE_CACHE_TRANSPORT", "direct")
            .run(["make", "build"])
            .build()
            .root();

        let extract = built.user("root").run([
            "find",
            "dist",
            "-type",
            "f",
            "-perm",
            "-111",
            "-exec",
            "cp",
            "{}",
            config.kernel_path.as_str(),
            ";",
            "-quit",
        ]);

        artifacts(extract, &config.output_dir)
    }
}
