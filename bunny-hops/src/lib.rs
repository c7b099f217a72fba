//! Packaging-plan compiler for unikernel images.
//!
//! A packaging request names a unikernel framework and monitor, a kernel
//! and optionally a root filesystem. Planning turns it into
//! [`PackInstructions`]: a base state, the copies to apply on top of it and
//! the annotations the urunc runtime reads. [`pack_llb`] then materializes
//! the instructions into an operation graph for the execution engine.
//!
//! ```
//! use bunny_hops::{HopsConfig, pack_llb, parse_file};
//!
//! let bunnyfile = b"
//! version: v0.1
//! platforms:
//!   framework: unikraft
//!   monitor: qemu
//! kernel:
//!   from: local
//!   path: kernel
//! ";
//! let config = HopsConfig { host_arch: "amd64".into(), ..HopsConfig::default() };
//! let instructions = parse_file(bunnyfile, &config).unwrap();
//! assert_eq!(instructions.copies.len(), 1);
//!
//! let definition = pack_llb(&instructions, &config).unwrap();
//! assert!(!definition.is_empty());
//! ```

pub mod annotations;
pub mod builder;
pub mod config;
pub mod containerfile;
pub mod entry;
pub mod error;
pub mod framework;
pub mod hops;
pub mod image_config;
pub mod pack;
pub mod parse;
pub mod plan;
pub mod planner;
pub mod validate;

pub use config::{HOPS_VERSION, HopsConfig};
pub use entry::{Origin, SourceEntry};
pub use error::{ErrorKind, HopsError, HopsResult};
pub use framework::Framework;
pub use hops::{App, Hops, Kernel, Platform, Rootfs, RootfsType};
pub use image_config::{BoxError, ImageConfig, ImageMetadataResolver};
pub use pack::{ExecutionEngine, PackBundle, build, pack_llb, prepare, to_pack};
pub use parse::{InputFormat, detect_format, parse_file};
pub use plan::{PackConfig, PackCopy, PackInstructions};
pub use planner::{BaseSelection, set_base_and_get_paths};
