use crate::platform::Platform;
use base64::Engine;
use serde::{Serialize, Serializer};

/// Where a source operation pulls its content from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// A registry image, optionally pinned to a platform
    Image {
        reference: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        platform: Option<Platform>,
    },
    /// A named directory supplied by the client, usually the build context
    Local { name: String },
    /// A branch or tag of a git repository
    Git { remote: String, reference: String },
}

impl Source {
    /// Source identifier understood by the execution engine.
    #[must_use]
    pub fn identifier(&self) -> String {
        match self {
            Source::Image { reference, .. } => format!("docker-image://{reference}"),
            Source::Local { name } => format!("local://{name}"),
            Source::Git { remote, reference } => {
                let remote = remote
                    .split_once("://")
                    .map_or(remote.as_str(), |(_, rest)| rest);
                format!("git://{remote}#{reference}")
            }
        }
    }
}

/// A single filesystem action.
///
/// The action reads input 0 as the state it modifies. `Copy` also reads
/// input 1 as the state it copies from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Mkdir {
        path: String,
        mode: u32,
        make_parents: bool,
    },
    Mkfile {
        path: String,
        mode: u32,
        #[serde(serialize_with = "serialize_base64")]
        data: Vec<u8>,
    },
    Copy {
        src: String,
        dest: String,
        create_dest_path: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        owner: Option<u32>,
    },
}

/// A mount of one of the exec inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Mount {
    pub target: String,
    /// Index into the exec inputs, a scratch input mounts an empty directory
    pub input: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub readonly: bool,
    /// Output index exposing the mount after the command ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<usize>,
}

/// A command run inside the root mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExecOp {
    pub args: Vec<String>,
    pub cwd: String,
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub mounts: Vec<Mount>,
}

/// One vertex of the operation graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Source {
        #[serde(flatten)]
        source: Source,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_name: Option<String>,
    },
    File(FileAction),
    Exec(ExecOp),
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        let image = Source::Image {
            reference: "docker.io/library/alpine:latest".to_string(),
            platform: None,
        };
        assert_eq!(image.identifier(), "docker-image://docker.io/library/alpine:latest");

        let local = Source::Local {
            name: "context".to_string(),
        };
        assert_eq!(local.identifier(), "local://context");

        let git = Source::Git {
            remote: "https://github.com/cloudkernels/rumprun-hello".to_string(),
            reference: "main".to_string(),
        };
        assert_eq!(git.identifier(), "git://github.com/cloudkernels/rumprun-hello#main");
    }

    #[test]
    fn test_mkfile_data_is_base64_encoded() {
        let op = Op::File(FileAction::Mkfile {
            path: "/urunc.json".to_string(),
            mode: 0o644,
            data: b"{}".to_vec(),
        });
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["file"]["mkfile"]["data"], "e30=");
        assert_eq!(json["file"]["mkfile"]["mode"], 420);
    }

    #[test]
    fn test_source_serialization_is_flat() {
        let op = Op::Source {
            source: Source::Local {
                name: "context".to_string(),
            },
            custom_name: None,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["source"]["kind"], "local");
        assert_eq!(json["source"]["name"], "context");
    }
}
