//! bunny - packaging-plan compiler for unikernel images
//!
//! Reads a bunnyfile or Containerfile, plans the image and prints the
//! marshalled operation graph, a plan summary or the image config.

use bunny_hops::{
    BoxError, HopsConfig, ImageMetadataResolver, PackInstructions, pack_llb, parse_file, prepare,
};
use bunny_llb::Platform;
use clap::{Parser, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// What to print on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    /// The marshalled operation graph as JSON
    Definition,
    /// A human readable summary of the plan
    Plan,
    /// The OCI image config of the produced image
    Config,
}

#[derive(Parser, Debug)]
#[command(name = "bunny")]
#[command(about = "Packaging-plan compiler for unikernel images")]
#[command(version)]
struct Opts {
    /// Bunnyfile or Containerfile to plan
    #[arg(short, long)]
    file: PathBuf,

    #[arg(short, long, value_enum, default_value = "definition")]
    output: Output,

    /// Name of the local build-context source
    #[arg(long, env = "BUNNY_CONTEXT", default_value = "context")]
    context: String,

    /// In-image path of the kernel
    #[arg(long, env = "BUNNY_KERNEL_PATH", default_value = "/.boot/kernel")]
    kernel_path: String,

    /// In-image path of the rootfs
    #[arg(long, env = "BUNNY_ROOTFS_PATH", default_value = "/.boot/rootfs")]
    rootfs_path: String,

    /// Architecture of the produced image, defaults to the host's
    #[arg(long, env = "BUNNY_HOST_ARCH")]
    host_arch: Option<String>,
}

impl Opts {
    fn hops_config(&self) -> HopsConfig {
        let defaults = HopsConfig::default();
        HopsConfig {
            build_context: self.context.clone(),
            kernel_path: self.kernel_path.clone(),
            rootfs_path: self.rootfs_path.clone(),
            host_arch: self.host_arch.clone().unwrap_or(defaults.host_arch.clone()),
            ..defaults
        }
    }
}

/// Stands in for a registry when running without an execution engine.
struct OfflineResolver;

impl ImageMetadataResolver for OfflineResolver {
    fn resolve_image_config(
        &self,
        reference: &str,
        platform: &Platform,
    ) -> Result<Vec<u8>, BoxError> {
        warn!(%reference, %platform, "No registry access, starting from an empty image config");
        Ok(b"{}".to_vec())
    }
}

fn render_plan(instructions: &PackInstructions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "base: {}", instructions.config.base_ref);
    if !instructions.config.monitor.is_empty() {
        let _ = writeln!(out, "monitor: {}", instructions.config.monitor);
    }
    let _ = writeln!(out, "copies:");
    for copy in &instructions.copies {
        let source = copy
            .state
            .source_op()
            .map_or_else(|| "<built>".to_string(), |source| source.identifier());
        let _ = writeln!(out, "  {source}:{} -> {}", copy.src, copy.dst);
    }
    let _ = writeln!(out, "annotations:");
    for (key, value) in &instructions.annotations {
        let _ = writeln!(out, "  {key}={value}");
    }
    out
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bunny=info,bunny_hops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let opts = Opts::parse();
    let config = opts.hops_config();

    let bytes = tokio::fs::read(&opts.file)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", opts.file.display()))?;
    info!(file = %opts.file.display(), "Planning");

    match opts.output {
        Output::Definition => {
            let instructions = parse_file(&bytes, &config)?;
            let definition = pack_llb(&instructions, &config)?;
            println!("{}", definition.to_json()?);
        }
        Output::Plan => {
            let instructions = parse_file(&bytes, &config)?;
            print!("{}", render_plan(&instructions));
        }
        Output::Config => {
            let bundle = prepare(&bytes, &config, &OfflineResolver)?;
            println!("{}", serde_json::to_string_pretty(&bundle.image_config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunny_hops::PackCopy;
    use bunny_llb::State;

    #[test]
    fn test_defaults() {
        let opts = Opts::try_parse_from(["bunny", "-f", "bunnyfile"]).unwrap();
        assert_eq!(opts.output, Output::Definition);
        let config = opts.hops_config();
        assert_eq!(config, HopsConfig::default());
    }

    #[test]
    fn test_overrides() {
        let opts = Opts::try_parse_from([
            "bunny",
            "--file",
            "Containerfile",
            "--output",
            "plan",
            "--context",
            "ctx",
            "--kernel-path",
            "/kernel",
            "--host-arch",
            "arm64",
        ])
        .unwrap();
        assert_eq!(opts.output, Output::Plan);
        let config = opts.hops_config();
        assert_eq!(config.build_context, "ctx");
        assert_eq!(config.kernel_path, "/kernel");
        assert_eq!(config.rootfs_path, "/.boot/rootfs");
        assert_eq!(config.host_arch, "arm64");
    }

    #[test]
    fn test_file_is_required() {
        assert!(Opts::try_parse_from(["bunny"]).is_err());
    }

    #[test]
    fn test_render_plan() {
        let mut instructions = PackInstructions::default();
        instructions.copies.push(PackCopy {
            state: State::local("context"),
            src: "kernel".into(),
            dst: "/.boot/kernel".into(),
        });
        instructions
            .annotations
            .insert("com.urunc.unikernel.hypervisor".into(), "qemu".into());

        let rendered = render_plan(&instructions);
        assert!(rendered.starts_with("base: scratch\n"));
        assert!(rendered.contains("  local://context:kernel -> /.boot/kernel\n"));
        assert!(rendered.contains("  com.urunc.unikernel.hypervisor=qemu\n"));
    }

    #[test]
    fn test_offline_resolver_yields_empty_config() {
        let blob = OfflineResolver
            .resolve_image_config("alpine", &Platform::linux("amd64"))
            .unwrap();
        assert_eq!(blob, b"{}");
    }
}
