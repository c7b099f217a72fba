//! Filesystem-assembly states and their operation graph.
//!
//! A [`State`] is an immutable handle on the output of an operation: pulling
//! an image, reading the local build context, cloning a repository, creating
//! a directory or file, copying between states, or running a command with
//! other states mounted. Every method returns a new handle and never touches
//! the receiver, so states can be shared freely while a plan is assembled.
//!
//! [`Definition::marshal`] walks the operations reachable from a state and
//! turns them into a content-addressed graph. Identical sub-graphs collapse
//! onto the same digest, which is what the execution engine keys its cache
//! on.
//!
//! ```
//! use bunny_llb::{Definition, Platform, State};
//!
//! let base = State::scratch().mkdir("/.boot", 0o755);
//! let image = base.copy(&State::local("context"), "kernel", "/.boot/kernel");
//!
//! let definition = Definition::marshal(&image, &Platform::linux("amd64")).unwrap();
//! assert_eq!(definition.len(), 3);
//! ```

mod definition;
mod error;
mod op;
mod platform;
mod reference;
mod state;

pub use definition::{Definition, InputRef, OpNode};
pub use error::{LlbError, LlbResult};
pub use op::{ExecOp, FileAction, Mount, Op, Source};
pub use platform::Platform;
pub use reference::normalize_image_reference;
pub use state::{CopyOptions, ExecBuilder, ExecState, MountOptions, SourceOptions, State};
