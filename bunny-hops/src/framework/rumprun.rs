use super::{COMMON_ARCHS, Framework, extend_rootfs, required_app, rootfs_from_includes};
use crate::builder::artifacts;
use crate::config::HopsConfig;
use crate::error::HopsResult;
use crate::hops::{App, Platform, Rootfs, RootfsType};
use bunny_llb::{MountOptions, SourceOptions, State};
use tracing::debug;

pub(super) const NAME: &str = "rumprun";

const MONITORS: &[&str] = &["hvt", "spt"];
const TOOLCHAIN_PATH: &str =
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin:/rumprun/rumprun-solo5/bin";

/// Rumprun unikernels, baked from application sources with the solo5
/// toolchain.
#[derive(Debug, Clone)]
pub struct Rumprun {
    platform: Platform,
    rootfs: Rootfs,
    app: Option<App>,
}

impl Rumprun {
    pub fn new(platform: Platform, rootfs: Rootfs, app: Option<App>) -> Self {
        Self {
            platform,
            rootfs,
            app,
        }
    }

    fn toolchain_tuple(&self, config: &HopsConfig) -> &'static str {
        let arch = if self.platform.architecture.is_empty() {
            config.host_arch.as_str()
        } else {
            self.platform.architecture.as_str()
        };
        match arch {
            "amd64" | "x86_64" | "x86" => "x86_64-rumprun-netbsd",
            _ => "aarch64-rumprun-netbsd",
        }
    }

    fn bake_target(&self) -> &'static str {
        if self.platform.monitor == "hvt" {
            "solo5_hvt"
        } else {
            "solo5_spt"
        }
    }
}

impl Framework for Rumprun {
    fn name(&self) -> &str {
        NAME
    }

    fn default_rootfs_type(&self) -> RootfsType {
        RootfsType::Raw
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

    /// Run `make` in the cloned repository, then bake the first executable
    /// of its `bin` directory into a solo5 kernel.
    fn build_kernel(&self, config: &HopsConfig) -> HopsResult<State> {
        let app = required_app(NAME, self.app.as_ref())?;
        let branch = if app.branch.is_empty() { "HEAD" } else { app.branch.as_str() };
        debug!(repository = %app.from, %branch, "Building rumprun kernel");

        let content = State::git(app.from.as_str(), branch);
        let toolset = State::image_with(
            config.rumprun_tools_image.as_str(),
            SourceOptions {
                platform: None,
                custom_name: Some("Internal:Build rumprun unikernel".to_string()),
            },
        );

        let app_dir = format!("{}/{}", config.work_dir, app.name);
        let bin_dir = format!("{app_dir}/bin");
        let build = toolset
            .dir(&app_dir)
            .add_env("PATH", TOOLCHAIN_PATH)
            .add_env("RUMPRUN_TOOLCHAIN_TUPLE", self.toolchain_tuple(config))
            .run(["make"])
            .mount(&config.work_dir, &content, MountOptions::default())
            .mount(&bin_dir, &State::scratch(), MountOptions::default())
            .build();
        let binaries = build.mount_output(&bin_dir)?;

        let bake = toolset
            .dir(&config.work_dir)
            .add_env("PATH", TOOLCHAIN_PATH)
            .run([
                "find",
                ".",
                "-type",
                "f",
                "-perm",
                "-111",
                "-exec",
                "rumprun-bake",
                self.bake_target(),
                config.kernel_path.as_str(),
                "{}",
                ";",
                "-quit",
            ])
            .mount(
                &config.work_dir,
                &binaries,
                MountOptions {
                    readonly: true,
                    selector: None,
                },
            );

        artifacts(bake, &config.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunny_llb::{Definition, Op, Source};

    fn rumprun(monitor: &str, arch: &str, app: Option<App>) -> Rumprun {
        Rumprun::new(
            Platform {
                framework: NAME.into(),
                monitor: monitor.into(),
                architecture: arch.into(),
                ..Platform::default()
            },
            Rootfs::default(),
            app,
        )
    }

    fn hello() -> App {
        App {
            name: "hello".into(),
            from: "https://github.com/cloudkernels/rumprun-hello".into(),
            branch: "main".into(),
        }
    }

    #[test]
    fn test_capabilities() {
        let framework = rumprun("hvt", "amd64", None);
        assert_eq!(framework.rootfs_type().unwrap(), RootfsType::Raw);
        assert!(framework.supports_rootfs_type("initrd"));
        assert!(!framework.supports_rootfs_type("block"));
        assert!(framework.supports_monitor("spt"));
        assert!(!framework.supports_monitor("qemu"));
        assert!(framework.supports_arch("aarch64"));
    }

    #[test]
    fn test_toolchain_tuple() {
        let config = HopsConfig {
            host_arch: "arm64".into(),
            ..HopsConfig::default()
        };
        assert_eq!(rumprun("hvt", "amd64", None).toolchain_tuple(&config), "x86_64-rumprun-netbsd");
        assert_eq!(
            rumprun("hvt", "arm64", None).toolchain_tuple(&config),
            "aarch64-rumprun-netbsd"
        );
        assert_eq!(rumprun("hvt", "", None).toolchain_tuple(&config), "aarch64-rumprun-netbsd");
    }

    #[test]
    fn test_build_kernel_pipeline() {
        let config = HopsConfig::default();
        let state = rumprun("spt", "amd64", Some(hello())).build_kernel(&config).unwrap();
        let definition = Definition::marshal(&state, &config.target_platform()).unwrap();

        assert!(definition.sources().any(|source| matches!(
            source,
            Source::Git { reference, .. } if reference == "main"
        )));

        let execs: Vec<_> = definition
            .ops()
            .filter_map(|node| match &node.op {
                Op::Exec(exec) => Some(exec),
                _ => None,
            })
            .collect();
        assert_eq!(execs.len(), 2);
        assert_eq!(execs[0].args, vec!["make"]);
        assert_eq!(execs[0].cwd, "/workdir/hello");
        assert!(
            execs[0]
                .env
                .contains(&"RUMPRUN_TOOLCHAIN_TUPLE=x86_64-rumprun-netbsd".to_string())
        );
        assert!(execs[1].args.contains(&"solo5_spt".to_string()));
        assert!(execs[1].args.contains(&"/.boot/kernel".to_string()));
    }

    #[test]
    fn test_build_kernel_needs_app() {
        let err = rumprun("hvt", "amd64", None).build_kernel(&HopsConfig::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
