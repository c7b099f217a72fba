use crate::error::{LlbError, LlbResult};
use crate::op::{ExecOp, FileAction, Mount, Op, Source};
use crate::platform::Platform;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct Vertex {
    pub(crate) op: Op,
    pub(crate) inputs: Vec<Option<Output>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Output {
    pub(crate) vertex: Arc<Vertex>,
    pub(crate) index: usize,
}

/// Defaults applied to commands run on top of a state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Meta {
    dir: Option<String>,
    env: BTreeMap<String, String>,
    user: Option<String>,
}

/// Immutable handle on the filesystem produced by an operation.
///
/// `State::scratch()` is the empty filesystem and has no operation behind it.
#[derive(Debug, Clone, Default)]
pub struct State {
    output: Option<Output>,
    meta: Meta,
}

/// Options for registry image sources.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub platform: Option<Platform>,
    pub custom_name: Option<String>,
}

/// Options for copies between states.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    pub create_dest_path: bool,
    pub owner: Option<u32>,
}

/// Options for an additional exec mount.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub readonly: bool,
    /// Only this path of the mounted state is visible
    pub selector: Option<String>,
}

impl State {
    pub fn scratch() -> Self {
        Self::default()
    }

    pub fn image(reference: impl Into<String>) -> Self {
        Self::image_with(reference, SourceOptions::default())
    }

    pub fn image_with(reference: impl Into<String>, options: SourceOptions) -> Self {
        Self::source(
            Source::Image {
                reference: reference.into(),
                platform: options.platform,
            },
            options.custom_name,
        )
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self::source(Source::Local { name: name.into() }, None)
    }

    pub fn git(remote: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::source(
            Source::Git {
                remote: remote.into(),
                reference: reference.into(),
            },
            None,
        )
    }

    fn source(source: Source, custom_name: Option<String>) -> Self {
        Self::from_vertex(
            Vertex {
                op: Op::Source {
                    source,
                    custom_name,
                },
                inputs: Vec::new(),
            },
            Meta::default(),
        )
    }

    fn from_vertex(vertex: Vertex, meta: Meta) -> Self {
        Self {
            output: Some(Output {
                vertex: Arc::new(vertex),
                index: 0,
            }),
            meta,
        }
    }

    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.output.is_none()
    }

    pub(crate) fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// The source this state reads directly, if it is a source operation.
    #[must_use]
    pub fn source_op(&self) -> Option<&Source> {
        match self.output.as_ref().map(|output| &output.vertex.op) {
            Some(Op::Source { source, .. }) => Some(source),
            _ => None,
        }
    }

    /// Set the working directory of later commands. Relative paths are
    /// resolved against the current one.
    #[must_use]
    pub fn dir(&self, path: &str) -> Self {
        let dir = if path.starts_with('/') {
            path.to_string()
        } else {
            let current = self.meta.dir.as_deref().unwrap_or("/");
            format!("{}/{}", current.trim_end_matches('/'), path)
        };
        let mut next = self.clone();
        next.meta.dir = Some(dir);
        next
    }

    #[must_use]
    pub fn add_env(&self, key: &str, value: &str) -> Self {
        let mut next = self.clone();
        let _ = next.meta.env.insert(key.to_string(), value.to_string());
        next
    }

    #[must_use]
    pub fn user(&self, user: &str) -> Self {
        let mut next = self.clone();
        next.meta.user = Some(user.to_string());
        next
    }

    #[must_use]
    pub fn mkdir(&self, path: &str, mode: u32) -> Self {
        self.file(
            FileAction::Mkdir {
                path: path.to_string(),
                mode,
                make_parents: true,
            },
            None,
        )
    }

    #[must_use]
    pub fn mkfile(&self, path: &str, mode: u32, data: Vec<u8>) -> Self {
        self.file(
            FileAction::Mkfile {
                path: path.to_string(),
                mode,
                data,
            },
            None,
        )
    }

    /// Copy `src` out of `from` onto this state at `dest`, creating the
    /// destination directories.
    #[must_use]
    pub fn copy(&self, from: &State, src: &str, dest: &str) -> Self {
        self.copy_with(
            from,
            src,
            dest,
            CopyOptions {
                create_dest_path: true,
                owner: None,
            },
        )
    }

    #[must_use]
    pub fn copy_with(&self, from: &State, src: &str, dest: &str, options: CopyOptions) -> Self {
        self.file(
            FileAction::Copy {
                src: src.to_string(),
                dest: dest.to_string(),
                create_dest_path: options.create_dest_path,
                owner: options.owner,
            },
            Some(from),
        )
    }

    fn file(&self, action: FileAction, secondary: Option<&State>) -> Self {
        let mut inputs = vec![self.output.clone()];
        if let Some(secondary) = secondary {
            inputs.push(secondary.output.clone());
        }
        Self::from_vertex(
            Vertex {
                op: Op::File(action),
                inputs,
            },
            self.meta.clone(),
        )
    }

    /// Start a command whose root filesystem is this state.
    pub fn run<I, S>(&self, args: I) -> ExecBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExecBuilder {
            root: self.clone(),
            args: args.into_iter().map(Into::into).collect(),
            mounts: Vec::new(),
        }
    }
}

/// A command being assembled; finished with [`ExecBuilder::build`].
#[derive(Debug, Clone)]
pub struct ExecBuilder {
    root: State,
    args: Vec<String>,
    mounts: Vec<(String, State, MountOptions)>,
}

impl ExecBuilder {
    #[must_use]
    pub fn mount(mut self, target: &str, state: &State, options: MountOptions) -> Self {
        self.mounts.push((target.to_string(), state.clone(), options));
        self
    }

    /// Freeze the command. Writable mounts get consecutive output indices
    /// after the root filesystem, which is output 0.
    #[must_use]
    pub fn build(self) -> ExecState {
        let meta = self.root.meta.clone();
        let mut inputs = vec![self.root.output.clone()];
        let mut mounts = vec![Mount {
            target: "/".to_string(),
            input: 0,
            selector: None,
            readonly: false,
            output: Some(0),
        }];
        let mut outputs = vec![("/".to_string(), 0)];

        for (target, state, options) in self.mounts {
            let output = (!options.readonly).then_some(outputs.len());
            if let Some(index) = output {
                outputs.push((target.clone(), index));
            }
            mounts.push(Mount {
                target,
                input: inputs.len(),
                selector: options.selector,
                readonly: options.readonly,
                output,
            });
            inputs.push(state.output);
        }

        let op = ExecOp {
            args: self.args,
            cwd: meta.dir.clone().unwrap_or_else(|| "/".to_string()),
            env: meta.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            user: meta.user.clone(),
            mounts,
        };

        ExecState {
            vertex: Arc::new(Vertex {
                op: Op::Exec(op),
                inputs,
            }),
            meta,
            outputs,
        }
    }
}

/// A frozen command and the states it produces.
#[derive(Debug, Clone)]
pub struct ExecState {
    vertex: Arc<Vertex>,
    meta: Meta,
    outputs: Vec<(String, usize)>,
}

impl ExecState {
    /// The root filesystem after the command ran.
    #[must_use]
    pub fn root(&self) -> State {
        self.output_state(0)
    }

    /// The content of the writable mount at `target` after the command ran.
    ///
    /// # Errors
    ///
    /// Returns `LlbError::UnknownMount` if no writable mount has that target.
    pub fn mount_output(&self, target: &str) -> LlbResult<State> {
        self.outputs
            .iter()
            .find(|(mount, _)| mount == target)
            .map(|&(_, index)| self.output_state(index))
            .ok_or_else(|| LlbError::UnknownMount(target.to_string()))
    }

    fn output_state(&self, index: usize) -> State {
        State {
            output: Some(Output {
                vertex: Arc::clone(&self.vertex),
                index,
            }),
            meta: self.meta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_has_no_operation() {
        let state = State::scratch();
        assert!(state.is_scratch());
        assert!(state.source_op().is_none());
        assert!(!State::local("context").is_scratch());
    }

    fn exec_op(state: &State) -> ExecOp {
        match &state.run(["true"]).build().vertex.op {
            Op::Exec(op) => op.clone(),
            other => panic!("expected exec operation, got {other:?}"),
        }
    }

    #[test]
    fn test_states_are_persistent() {
        let base = State::image("alpine");
        let with_dir = base.dir("/workdir");
        let nested = with_dir.dir("app").add_env("MODE", "hvt").user("opam");

        let op = exec_op(&base);
        assert_eq!(op.cwd, "/");
        assert!(op.env.is_empty());
        assert_eq!(op.user, None);

        let op = exec_op(&with_dir);
        assert_eq!(op.cwd, "/workdir");
        assert!(op.env.is_empty());

        let op = exec_op(&nested);
        assert_eq!(op.cwd, "/workdir/app");
        assert_eq!(op.env, vec!["MODE=hvt"]);
        assert_eq!(op.user.as_deref(), Some("opam"));
    }

    #[test]
    fn test_exec_uses_state_defaults() {
        let exec = State::image("alpine")
            .dir("/workdir")
            .add_env("B", "2")
            .add_env("A", "1")
            .run(["make"])
            .build();

        let Op::Exec(op) = &exec.vertex.op else {
            panic!("expected exec operation");
        };
        assert_eq!(op.cwd, "/workdir");
        assert_eq!(op.env, vec!["A=1", "B=2"]);
        assert_eq!(op.args, vec!["make"]);
    }

    #[test]
    fn test_exec_mount_outputs() {
        let content = State::local("context");
        let exec = State::image("tools")
            .run(["sh", "-c", "true"])
            .mount(
                "/workdir",
                &content,
                MountOptions {
                    readonly: true,
                    selector: None,
                },
            )
            .mount("/.boot", &State::scratch(), MountOptions::default())
            .build();

        let Op::Exec(op) = &exec.vertex.op else {
            panic!("expected exec operation");
        };
        assert_eq!(op.mounts.len(), 3);
        assert_eq!(op.mounts[1].output, None);
        assert_eq!(op.mounts[2].output, Some(1));
        assert_eq!(exec.vertex.inputs.len(), 3);
        assert!(exec.vertex.inputs[2].is_none());

        assert_eq!(exec.mount_output("/.boot").unwrap().output().unwrap().index, 1);
        assert!(matches!(
            exec.mount_output("/workdir"),
            Err(LlbError::UnknownMount(_))
        ));
        assert_eq!(exec.root().output().unwrap().index, 0);
    }
}
