//! Input format detection.

use crate::annotations::HYPERVISOR;
use crate::builder::base_llb;
use crate::config::HopsConfig;
use crate::containerfile::{Containerfile, Instruction, parse_containerfile};
use crate::error::{HopsError, HopsResult};
use crate::hops::Hops;
use crate::pack::to_pack;
use crate::plan::{PackCopy, PackInstructions};
use bunny_llb::State;
use tracing::debug;

/// Textual formats a packaging request can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Bunnyfile,
    Containerfile,
}

/// A file is a Containerfile when its first line that is neither blank nor
/// a comment starts with `FROM`.
#[must_use]
pub fn detect_format(bytes: &[u8]) -> InputFormat {
    let text = String::from_utf8_lossy(bytes);
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'));
    match first.and_then(|line| line.split_whitespace().next()) {
        Some(word) if word.eq_ignore_ascii_case("FROM") => InputFormat::Containerfile,
        _ => InputFormat::Bunnyfile,
    }
}

/// Parse either input format into packaging instructions.
///
/// # Errors
///
/// Returns validation errors for malformed input and any planning error.
pub fn parse_file(bytes: &[u8], config: &HopsConfig) -> HopsResult<PackInstructions> {
    let format = detect_format(bytes);
    debug!(?format, "Detected input format");
    match format {
        InputFormat::Bunnyfile => to_pack(&Hops::parse(bytes)?, config),
        InputFormat::Containerfile => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                HopsError::Validation(format!("Containerfile is not valid UTF-8: {e}"))
            })?;
            let containerfile = parse_containerfile(text).map_err(|e| {
                HopsError::Validation(format!("Failed to parse data as Containerfile: {e}"))
            })?;
            containerfile_to_pack(&containerfile, config)
        }
    }
}

/// Packaging instructions of a single-stage Containerfile.
///
/// The base is resolved once every label is known, so a hypervisor label
/// anywhere in the file pins builder-hub images to that monitor.
///
/// # Errors
///
/// Fails on a second `FROM`.
pub fn containerfile_to_pack(
    containerfile: &Containerfile,
    config: &HopsConfig,
) -> HopsResult<PackInstructions> {
    let mut instructions = PackInstructions::default();
    let mut base: Option<&str> = None;
    let context = State::local(config.build_context.as_str());

    for (_, instruction) in &containerfile.instructions {
        match instruction {
            Instruction::From { image } => {
                if base.is_some() {
                    return Err(HopsError::Validation(
                        "Multi-stage builds are not supported".into(),
                    ));
                }
                base = Some(image.as_str());
            }
            Instruction::Copy { src, dest } => instructions.copies.push(PackCopy {
                state: context.clone(),
                src: src.clone(),
                dst: dest.clone(),
            }),
            Instruction::Label { labels } => {
                for (key, value) in labels {
                    instructions.annotations.insert(key.clone(), value.clone());
                }
            }
            Instruction::Cmd { command } => instructions.config.cmd = command.clone(),
            Instruction::Entrypoint { command } => {
                instructions.config.entrypoint = command.clone();
            }
            Instruction::Env { vars } => instructions
                .config
                .env
                .extend(vars.iter().map(|(key, value)| format!("{key}={value}"))),
        }
    }

    let base_ref = base.unwrap_or("scratch");
    let monitor = instructions
        .annotations
        .get(HYPERVISOR)
        .cloned()
        .unwrap_or_default();
    instructions.base = base_llb(base_ref, &monitor, config);
    instructions.config.base_ref = base_ref.to_string();
    instructions.config.monitor = monitor;
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"FROM scratch\n"), InputFormat::Containerfile);
        assert_eq!(
            detect_format(b"#syntax=harbor.nbfc.io/nubificus/bunny:latest\n\nfrom scratch\n"),
            InputFormat::Containerfile
        );
        assert_eq!(
            detect_format(b"#syntax=harbor.nbfc.io/nubificus/bunny:latest\nversion: v0.1\n"),
            InputFormat::Bunnyfile
        );
        assert_eq!(detect_format(b"FROMAGE: cheese\n"), InputFormat::Bunnyfile);
        assert_eq!(detect_format(b""), InputFormat::Bunnyfile);
    }

    #[test]
    fn test_containerfile_to_pack() {
        let content = b"FROM unikraft.org/nginx:1.15
COPY index.html /nginx/html/index.html
LABEL com.urunc.unikernel.hypervisor=firecracker
LABEL \"com.urunc.unikernel.binary\"=\"/unikraft/bin/kernel\"
ENV DEBUG=1
CMD [\"-c\", \"/nginx/conf/nginx.conf\"]
";
        let instructions = parse_file(content, &HopsConfig::default()).unwrap();
        assert_eq!(instructions.copies.len(), 1);
        assert_eq!(instructions.copies[0].src, "index.html");
        assert_eq!(instructions.copies[0].dst, "/nginx/html/index.html");
        assert_eq!(
            instructions.annotations["com.urunc.unikernel.binary"],
            "/unikraft/bin/kernel"
        );
        assert_eq!(instructions.config.base_ref, "unikraft.org/nginx:1.15");
        assert_eq!(instructions.config.monitor, "firecracker");
        assert_eq!(instructions.config.env, vec!["DEBUG=1"]);
        assert_eq!(instructions.config.cmd, vec!["-c", "/nginx/conf/nginx.conf"]);
        assert!(matches!(
            instructions.base.source_op(),
            Some(bunny_llb::Source::Image { platform: Some(p), .. }) if p.os == "fc"
        ));
    }

    #[test]
    fn test_scratch_containerfile() {
        let content = b"FROM scratch\nCOPY kernel /.boot/kernel\n";
        let instructions = parse_file(content, &HopsConfig::default()).unwrap();
        assert!(instructions.base.is_scratch());
        assert_eq!(instructions.config.base_ref, "scratch");
    }

    #[test]
    fn test_multi_stage_is_rejected() {
        let err = parse_file(b"FROM alpine\nFROM scratch\n", &HopsConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Multi-stage builds are not supported");
    }

    #[test]
    fn test_unsupported_instruction_is_named() {
        let err = parse_file(b"FROM alpine\nRUN make\n", &HopsConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Unsupported command: RUN"));
    }

    #[test]
    fn test_bunnyfile_validation_errors() {
        let content = b"version: v0.1\nplatforms:\n  monitor: qemu\n";
        let err = parse_file(content, &HopsConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "The framework field of platforms is necessary");
    }
}
