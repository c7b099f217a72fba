//! Plan orchestration and final graph materialization.

use crate::annotations::build_annotations;
use crate::builder::copy_llb;
use crate::config::HopsConfig;
use crate::entry::{resolve_kernel, resolve_rootfs};
use crate::error::{HopsError, HopsResult};
use crate::framework::select;
use crate::hops::Hops;
use crate::image_config::{BoxError, ImageConfig, ImageMetadataResolver, base_image_config};
use crate::parse::parse_file;
use crate::plan::{PackConfig, PackInstructions};
use crate::planner::set_base_and_get_paths;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bunny_llb::Definition;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Architectures the final image can be produced for.
const PACK_ARCHS: &[&str] = &["amd64", "arm", "arm64"];

/// Turn a validated request into packaging instructions.
///
/// Unsupported monitors and architectures are only reported; the rootfs
/// type is enforced.
///
/// # Errors
///
/// Returns the first capability, resolution or planning error.
pub fn to_pack(hops: &Hops, config: &HopsConfig) -> HopsResult<PackInstructions> {
    let platform = &hops.platform;
    let framework = select(platform, &hops.rootfs, hops.app.as_ref());

    if !framework.supports_monitor(&platform.monitor) {
        warn!(
            framework = framework.name(),
            monitor = %platform.monitor,
            "Monitor is not supported by framework"
        );
    }
    let arch = if platform.architecture.is_empty() {
        config.host_arch.as_str()
    } else {
        platform.architecture.as_str()
    };
    if !framework.supports_arch(arch) {
        warn!(
            framework = framework.name(),
            %arch,
            "Architecture is not supported by framework"
        );
    }

    let rootfs = resolve_rootfs(&hops.rootfs, framework.as_ref(), &platform.monitor, config)
        .map_err(|e| e.context("Error handling rootfs entry"))?;
    let kernel = resolve_kernel(
        &hops.kernel,
        hops.app.as_ref(),
        framework.as_ref(),
        &platform.monitor,
        config,
    )
    .map_err(|e| e.context("Error handling kernel entry"))?;

    let selection = set_base_and_get_paths(&kernel, &rootfs, config)
        .map_err(|e| e.context("Error choosing base state"))?;

    let rootfs_type = if rootfs.is_empty() {
        String::new()
    } else {
        framework.rootfs_type()?.to_string()
    };
    let cmd = hops.command();
    let annotations = build_annotations(
        platform,
        &cmd,
        &selection.kernel_path,
        &selection.rootfs_path,
        &rootfs_type,
    )?;

    info!(
        framework = framework.name(),
        base = %selection.base_ref,
        copies = selection.copies.len(),
        "Planned unikernel image"
    );

    Ok(PackInstructions {
        base: selection.base,
        copies: selection.copies,
        annotations,
        config: PackConfig {
            base_ref: selection.base_ref,
            monitor: platform.monitor.clone(),
            entrypoint: hops.entrypoint.clone(),
            cmd,
            env: hops.envs.clone(),
        },
    })
}

/// Assemble the final image graph: every planned copy on top of the base,
/// then the metadata file.
///
/// The metadata file is a JSON object mapping each annotation to its
/// base64-encoded value, since annotations do not always reach the runtime.
///
/// # Errors
///
/// Fails for an unsupported host architecture or when the graph cannot be
/// marshalled.
pub fn pack_llb(instructions: &PackInstructions, config: &HopsConfig) -> HopsResult<Definition> {
    if !PACK_ARCHS.contains(&config.host_arch.as_str()) {
        return Err(HopsError::Materialization(format!(
            "Unsupported architecture: {}",
            config.host_arch
        )));
    }

    let encoded: BTreeMap<&str, String> = instructions
        .annotations
        .iter()
        .map(|(key, value)| (key.as_str(), STANDARD.encode(value)))
        .collect();
    let metadata = serde_json::to_vec(&encoded)
        .map_err(|e| HopsError::Materialization(format!("Failed to marshal urunc json: {e}")))?;

    let mut state = instructions.base.clone();
    for copy in &instructions.copies {
        state = copy_llb(&state, copy);
    }
    let state = state.mkfile(&config.metadata_path, 0o644, metadata);

    let definition = Definition::marshal(&state, &config.target_platform())?;
    debug!(ops = definition.len(), "Marshalled image definition");
    Ok(definition)
}

/// Everything the execution engine needs to produce the image.
#[derive(Debug)]
pub struct PackBundle {
    pub definition: Definition,
    pub image_config: ImageConfig,
    pub annotations: BTreeMap<String, String>,
}

/// The engine that runs a marshalled definition.
pub trait ExecutionEngine: ImageMetadataResolver {
    /// Execute the bundle and export the resulting image.
    ///
    /// # Errors
    ///
    /// Any failure of the engine.
    fn solve(&self, bundle: &PackBundle) -> Result<(), BoxError>;
}

/// Plan `bytes`, then hand the result to `engine`.
///
/// # Errors
///
/// Returns planning errors unchanged and engine failures as
/// materialization errors.
pub fn build<E: ExecutionEngine + ?Sized>(
    bytes: &[u8],
    config: &HopsConfig,
    engine: &E,
) -> HopsResult<PackBundle> {
    let bundle = prepare(bytes, config, engine)?;
    engine
        .solve(&bundle)
        .map_err(|e| HopsError::Materialization(format!("Failed to solve image: {e}")))?;
    Ok(bundle)
}

/// Plan `bytes` and prepare the bundle without executing it.
///
/// # Errors
///
/// Returns planning, config resolution and marshalling errors.
pub fn prepare<R: ImageMetadataResolver + ?Sized>(
    bytes: &[u8],
    config: &HopsConfig,
    resolver: &R,
) -> HopsResult<PackBundle> {
    let instructions = parse_file(bytes, config)?;
    let definition = pack_llb(&instructions, config)?;

    let mut image_config = base_image_config(
        resolver,
        &instructions.config.base_ref,
        &instructions.config.monitor,
        config,
    )?;
    image_config.apply_plan(&instructions.config, &instructions.annotations, config);

    Ok(PackBundle {
        definition,
        image_config,
        annotations: instructions.annotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{BINARY, MOUNT_ROOTFS};
    use crate::error::ErrorKind;
    use crate::plan::PackCopy;
    use bunny_llb::{FileAction, Op, Platform, State};
    use std::cell::RefCell;
    use tracing_test::traced_test;

    fn config() -> HopsConfig {
        HopsConfig {
            host_arch: "amd64".into(),
            ..HopsConfig::default()
        }
    }

    fn bunnyfile(kernel: &str, extra: &str) -> Hops {
        let yaml = format!(
            "version: v0.1\nplatforms:\n  framework: unikraft\n  monitor: qemu\n{kernel}{extra}"
        );
        Hops::parse(yaml.as_bytes()).unwrap()
    }

    #[test]
    fn test_to_pack_local_kernel() {
        let hops = bunnyfile("kernel:\n  from: local\n  path: kernel\n", "cmdline: hello world\n");
        let instructions = to_pack(&hops, &config()).unwrap();
        assert!(instructions.base.is_scratch());
        assert_eq!(instructions.copies.len(), 1);
        assert_eq!(instructions.annotations[BINARY], "/.boot/kernel");
        assert_eq!(instructions.annotations[MOUNT_ROOTFS], "false");
        assert_eq!(instructions.config.cmd, vec!["hello", "world"]);
        assert_eq!(instructions.config.base_ref, "scratch");
    }

    #[traced_test]
    #[test]
    fn test_unsupported_monitor_is_advisory() {
        let yaml = "version: v0.1
platforms:
  framework: rumprun
  monitor: qemu
  architecture: riscv64
kernel:
  from: local
  path: kernel
";
        let hops = Hops::parse(yaml.as_bytes()).unwrap();
        let instructions = to_pack(&hops, &config()).unwrap();
        assert_eq!(instructions.copies.len(), 1);
        assert!(logs_contain("Monitor is not supported by framework"));
        assert!(logs_contain("Architecture is not supported by framework"));
    }

    #[test]
    fn test_to_pack_wraps_rootfs_errors() {
        let hops = bunnyfile(
            "kernel:\n  from: local\n  path: kernel\n",
            "rootfs:\n  type: block\n  include:\n    - a\n",
        );
        let err = to_pack(&hops, &config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert!(err.to_string().starts_with("Error handling rootfs entry: "));
    }

    #[test]
    fn test_pack_llb_writes_metadata_file() {
        let mut instructions = PackInstructions::default();
        instructions.copies.push(PackCopy {
            state: State::local("context"),
            src: "kernel".into(),
            dst: "/.boot/kernel".into(),
        });
        instructions
            .annotations
            .insert("com.urunc.unikernel.hypervisor".into(), "qemu".into());

        let definition = pack_llb(&instructions, &config()).unwrap();
        assert_eq!(definition.platform(), &Platform::linux("amd64"));

        let root = definition.root_op().unwrap();
        let Op::File(FileAction::Mkfile { path, mode, data }) = &root.op else {
            panic!("metadata file must be written last");
        };
        assert_eq!(path, "/urunc.json");
        assert_eq!(*mode, 0o644);
        let json: BTreeMap<String, String> = serde_json::from_slice(data).unwrap();
        assert_eq!(json["com.urunc.unikernel.hypervisor"], "cWVtdQ==");
    }

    #[test]
    fn test_pack_llb_rejects_unsupported_arch() {
        let config = HopsConfig {
            host_arch: "riscv64".into(),
            ..HopsConfig::default()
        };
        let err = pack_llb(&PackInstructions::default(), &config).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported architecture: riscv64");
        assert_eq!(err.kind(), ErrorKind::Materialization);
    }

    #[test]
    fn test_pack_llb_rejects_invalid_reference() {
        let instructions = PackInstructions {
            base: State::image("/foo"),
            ..PackInstructions::default()
        };
        let err = pack_llb(&instructions, &config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Materialization);
        assert!(err.to_string().starts_with("Failed to marshal"));
    }

    struct Engine {
        solved: RefCell<usize>,
    }

    impl ImageMetadataResolver for Engine {
        fn resolve_image_config(&self, _: &str, _: &Platform) -> Result<Vec<u8>, BoxError> {
            Ok(br#"{"config": {"Env": ["PATH=/bin"]}}"#.to_vec())
        }
    }

    impl ExecutionEngine for Engine {
        fn solve(&self, bundle: &PackBundle) -> Result<(), BoxError> {
            if bundle.definition.is_empty() {
                return Err("nothing to solve".into());
            }
            *self.solved.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_build_hands_bundle_to_engine() {
        let engine = Engine {
            solved: RefCell::new(0),
        };
        let input = br#"version: v0.1
platforms:
  framework: unikraft
  monitor: qemu
kernel:
  from: unikraft.org/nginx:1.15
  path: /unikraft/bin/kernel
cmd: ["-c", "/nginx/conf/nginx.conf"]
"#;
        let bundle = build(input, &config(), &engine).unwrap();
        assert_eq!(*engine.solved.borrow(), 1);
        assert_eq!(bundle.image_config.config.env, vec!["PATH=/bin"]);
        assert_eq!(bundle.image_config.config.cmd, vec!["-c", "/nginx/conf/nginx.conf"]);
        assert_eq!(
            bundle.image_config.config.labels[BINARY],
            "/unikraft/bin/kernel"
        );
        assert_eq!(bundle.annotations[BINARY], "/unikraft/bin/kernel");
    }
}
