//! Pre-planning checks on a decoded packaging request.
//!
//! Every check reports the first problem it finds as a validation error,
//! with a message meant to be shown to the user verbatim.

use crate::config::HOPS_VERSION;
use crate::error::{HopsError, HopsResult};
use crate::hops::{App, Hops, Kernel, Platform, Rootfs};
use semver::Version;

/// Run every check in the order the fields appear in a bunnyfile.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(hops: &Hops) -> HopsResult<()> {
    check_version(&hops.version)?;
    validate_platform(&hops.platform)?;
    validate_kernel(&hops.kernel, hops.app.as_ref())?;
    validate_rootfs(&hops.rootfs)?;
    validate_envs(&hops.envs)
}

/// Reject missing versions and versions newer than [`HOPS_VERSION`].
///
/// # Errors
///
/// Returns a validation error for empty, unparsable or unsupported versions.
pub fn check_version(version: &str) -> HopsResult<()> {
    if version.is_empty() {
        return Err(HopsError::Validation("The version field is necessary".into()));
    }
    let supported = parse_version(HOPS_VERSION).ok_or_else(|| {
        HopsError::Invariant(format!("Could not parse hops API version {HOPS_VERSION}"))
    })?;
    let requested = parse_version(version).ok_or_else(|| {
        HopsError::Validation(format!("Could not parse version in user bunnyfile {version}"))
    })?;
    if requested > supported {
        return Err(HopsError::Validation(format!(
            "Unsupported version {version}. Please use {HOPS_VERSION} or earlier"
        )));
    }
    Ok(())
}

/// Accepts a leading `v` and missing minor or patch components.
fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let (core, suffix) = trimmed
        .find(['-', '+'])
        .map_or((trimmed, ""), |index| trimmed.split_at(index));
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{suffix}", parts.join("."))).ok()
}

/// # Errors
///
/// Fails when framework or monitor is missing.
pub fn validate_platform(platform: &Platform) -> HopsResult<()> {
    if platform.framework.is_empty() {
        return Err(HopsError::Validation(
            "The framework field of platforms is necessary".into(),
        ));
    }
    if platform.monitor.is_empty() {
        return Err(HopsError::Validation(
            "The monitor field of platforms is necessary".into(),
        ));
    }
    Ok(())
}

/// The kernel section may only be left out when application sources are
/// given instead.
///
/// # Errors
///
/// Fails when `from` or `path` is missing and no app is declared.
pub fn validate_kernel(kernel: &Kernel, app: Option<&App>) -> HopsResult<()> {
    if let Some(app) = app {
        if kernel.from.is_empty() && kernel.path.is_empty() {
            return validate_app(app);
        }
    }
    if kernel.from.is_empty() {
        return Err(HopsError::Validation("The from field of kernel is necessary".into()));
    }
    if kernel.path.is_empty() {
        return Err(HopsError::Validation("The path field of kernel is necessary".into()));
    }
    Ok(())
}

/// # Errors
///
/// Fails when the app name or source is missing.
pub fn validate_app(app: &App) -> HopsResult<()> {
    if app.name.is_empty() {
        return Err(HopsError::Validation("The name field of app is necessary".into()));
    }
    if app.from.is_empty() {
        return Err(HopsError::Validation("The from field of app is necessary".into()));
    }
    Ok(())
}

/// # Errors
///
/// Fails on contradictory combinations of `from`, `path`, `type` and
/// `include`.
pub fn validate_rootfs(rootfs: &Rootfs) -> HopsResult<()> {
    if rootfs.is_scratch() && !rootfs.path.is_empty() {
        return Err(HopsError::Validation(
            "The from field of rootfs can not be empty or scratch, if path is set".into(),
        ));
    }
    if !rootfs.path.is_empty() && rootfs.rootfs_type == "raw" {
        return Err(HopsError::Validation(
            "The path field in rootfs can not be combined with a raw rootfs".into(),
        ));
    }
    if rootfs.from == "local" && rootfs.rootfs_type == "raw" {
        return Err(HopsError::Validation(
            "If type of rootfs is raw, then from can not be local".into(),
        ));
    }
    if !rootfs.includes.is_empty() && !rootfs.is_scratch() {
        return Err(HopsError::Validation(
            "Adding files to an existing rootfs is not yet supported".into(),
        ));
    }
    for entry in &rootfs.includes {
        if entry.split(':').next().is_none_or(str::is_empty) {
            return Err(HopsError::Validation(format!(
                "Invalid syntax in rootfs include {entry:?}. \
                 An entry can not have its first part empty"
            )));
        }
    }
    Ok(())
}

/// # Errors
///
/// Fails for entries that are not `KEY=VALUE`.
pub fn validate_envs(envs: &[String]) -> HopsResult<()> {
    for env in envs {
        match env.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            _ => {
                return Err(HopsError::Validation(format!(
                    "Invalid environment variable {env:?}. Expected KEY=VALUE"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn message(result: HopsResult<()>) -> String {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        err.to_string()
    }

    #[test]
    fn test_version() {
        assert!(check_version("v0.1").is_ok());
        assert!(check_version("0.1").is_ok());
        assert!(check_version("0.0.9").is_ok());
        assert!(check_version("v0.1.0").is_ok());
        assert_eq!(message(check_version("")), "The version field is necessary");
        assert_eq!(
            message(check_version("0.2")),
            "Unsupported version 0.2. Please use v0.1 or earlier"
        );
        assert!(message(check_version("0.1.1")).starts_with("Unsupported version"));
        assert!(message(check_version("latest")).starts_with("Could not parse version"));
        assert!(message(check_version("1.2.3.4")).starts_with("Could not parse version"));
    }

    #[test]
    fn test_platform() {
        let platform = Platform {
            framework: "unikraft".into(),
            monitor: "qemu".into(),
            ..Platform::default()
        };
        assert!(validate_platform(&platform).is_ok());

        let no_framework = Platform {
            framework: String::new(),
            ..platform.clone()
        };
        assert_eq!(
            message(validate_platform(&no_framework)),
            "The framework field of platforms is necessary"
        );

        let no_monitor = Platform {
            monitor: String::new(),
            ..platform
        };
        assert_eq!(
            message(validate_platform(&no_monitor)),
            "The monitor field of platforms is necessary"
        );
    }

    #[test]
    fn test_kernel() {
        let kernel = Kernel {
            from: "local".into(),
            path: "kernel".into(),
        };
        assert!(validate_kernel(&kernel, None).is_ok());
        assert_eq!(
            message(validate_kernel(&Kernel::default(), None)),
            "The from field of kernel is necessary"
        );
        assert_eq!(
            message(validate_kernel(
                &Kernel {
                    from: "local".into(),
                    path: String::new()
                },
                None
            )),
            "The path field of kernel is necessary"
        );
    }

    #[test]
    fn test_kernel_replaced_by_app() {
        let app = App {
            name: "hello".into(),
            from: "https://github.com/cloudkernels/rumprun-hello".into(),
            branch: "main".into(),
        };
        assert!(validate_kernel(&Kernel::default(), Some(&app)).is_ok());

        let nameless = App {
            name: String::new(),
            ..app
        };
        assert_eq!(
            message(validate_kernel(&Kernel::default(), Some(&nameless))),
            "The name field of app is necessary"
        );
    }

    #[test]
    fn test_rootfs() {
        let ok = Rootfs {
            includes: vec!["a:b".into(), "c".into()],
            ..Rootfs::default()
        };
        assert!(validate_rootfs(&ok).is_ok());

        let cases = [
            (
                Rootfs {
                    path: "rootfs".into(),
                    ..Rootfs::default()
                },
                "The from field of rootfs can not be empty or scratch, if path is set",
            ),
            (
                Rootfs {
                    from: "harbor.nbfc.io/rootfs".into(),
                    path: "rootfs".into(),
                    rootfs_type: "raw".into(),
                    includes: Vec::new(),
                },
                "The path field in rootfs can not be combined with a raw rootfs",
            ),
            (
                Rootfs {
                    from: "local".into(),
                    rootfs_type: "raw".into(),
                    ..Rootfs::default()
                },
                "If type of rootfs is raw, then from can not be local",
            ),
            (
                Rootfs {
                    from: "harbor.nbfc.io/rootfs".into(),
                    includes: vec!["a".into()],
                    ..Rootfs::default()
                },
                "Adding files to an existing rootfs is not yet supported",
            ),
        ];
        for (rootfs, expected) in cases {
            assert_eq!(message(validate_rootfs(&rootfs)), expected);
        }

        let empty_source = Rootfs {
            from: String::new(),
            includes: vec![":b".into()],
            ..Rootfs::default()
        };
        assert!(
            message(validate_rootfs(&empty_source)).starts_with("Invalid syntax in rootfs include")
        );
    }

    #[test]
    fn test_envs() {
        assert!(validate_envs(&["A=1".into(), "B=".into()]).is_ok());
        assert!(message(validate_envs(&["=1".into()])).starts_with("Invalid environment variable"));
        assert!(
            message(validate_envs(&["PATH".into()])).starts_with("Invalid environment variable")
        );
    }
}
