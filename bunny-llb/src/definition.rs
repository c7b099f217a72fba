use crate::error::LlbResult;
use crate::op::{Op, Source};
use crate::platform::Platform;
use crate::reference::normalize_image_reference;
use crate::state::{State, Vertex};
use bunny_graph::{DAG, NodeId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Reference to one output of another operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InputRef {
    pub digest: String,
    pub index: usize,
}

/// A marshalled operation. `None` inputs read the empty filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OpNode {
    pub digest: String,
    pub op: Op,
    pub inputs: Vec<Option<InputRef>>,
}

/// Content-addressed operation graph reachable from one state.
///
/// Each node's digest covers its operation and the digests of its inputs,
/// so equal sub-graphs share a node.
#[derive(Debug, Clone)]
pub struct Definition {
    graph: DAG<OpNode, usize>,
    by_digest: HashMap<String, NodeId>,
    /// Topological order of `graph`
    order: Vec<NodeId>,
    root: Option<InputRef>,
    platform: Platform,
}

#[derive(Serialize)]
struct DigestInput<'a> {
    op: &'a Op,
    inputs: &'a [Option<InputRef>],
}

#[derive(Serialize)]
struct DefinitionDocument<'a> {
    platform: &'a Platform,
    root: Option<&'a InputRef>,
    ops: Vec<&'a OpNode>,
}

impl Definition {
    /// Marshal every operation reachable from `state`.
    ///
    /// Image sources without an explicit platform are pinned to `platform`,
    /// and every image reference is normalized.
    ///
    /// # Errors
    ///
    /// Fails on malformed image references.
    pub fn marshal(state: &State, platform: &Platform) -> LlbResult<Self> {
        let mut definition = Self {
            graph: DAG::new(),
            by_digest: HashMap::new(),
            order: Vec::new(),
            root: None,
            platform: platform.clone(),
        };
        let mut visited = HashMap::new();

        if let Some(output) = state.output() {
            let node = definition.visit(&output.vertex, &mut visited)?;
            definition.root = Some(InputRef {
                digest: definition.graph.node(node)?.digest.clone(),
                index: output.index,
            });
        }
        definition.order = definition.graph.topological_sort()?;

        debug!(
            ops = definition.graph.node_count(),
            edges = definition.graph.edge_count(),
            "Marshalled definition"
        );
        Ok(definition)
    }

    fn visit(
        &mut self,
        vertex: &Arc<Vertex>,
        visited: &mut HashMap<*const Vertex, NodeId>,
    ) -> LlbResult<NodeId> {
        if let Some(&node) = visited.get(&Arc::as_ptr(vertex)) {
            return Ok(node);
        }

        let mut inputs = Vec::with_capacity(vertex.inputs.len());
        let mut upstream = Vec::new();
        for (position, input) in vertex.inputs.iter().enumerate() {
            match input {
                Some(output) => {
                    let node = self.visit(&output.vertex, visited)?;
                    upstream.push((node, position));
                    inputs.push(Some(InputRef {
                        digest: self.graph.node(node)?.digest.clone(),
                        index: output.index,
                    }));
                }
                None => inputs.push(None),
            }
        }

        let op = self.normalize(&vertex.op)?;
        let digest = digest_of(&op, &inputs)?;

        let node = match self.by_digest.get(&digest) {
            Some(&existing) => existing,
            None => {
                let node = self.graph.add_node(OpNode {
                    digest: digest.clone(),
                    op,
                    inputs,
                });
                for (from, position) in upstream {
                    self.graph.add_edge(from, node, position)?;
                }
                let _ = self.by_digest.insert(digest, node);
                node
            }
        };

        let _ = visited.insert(Arc::as_ptr(vertex), node);
        Ok(node)
    }

    fn normalize(&self, op: &Op) -> LlbResult<Op> {
        match op {
            Op::Source {
                source: Source::Image {
                    reference,
                    platform,
                },
                custom_name,
            } => Ok(Op::Source {
                source: Source::Image {
                    reference: normalize_image_reference(reference)?,
                    platform: Some(platform.clone().unwrap_or_else(|| self.platform.clone())),
                },
                custom_name: custom_name.clone(),
            }),
            other => Ok(other.clone()),
        }
    }

    /// Output the definition evaluates to; `None` for the empty filesystem.
    #[must_use]
    pub fn root(&self) -> Option<&InputRef> {
        self.root.as_ref()
    }

    /// The operation producing the root output.
    #[must_use]
    pub fn root_op(&self) -> Option<&OpNode> {
        self.root.as_ref().and_then(|root| self.get(&root.digest))
    }

    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    #[must_use]
    pub fn get(&self, digest: &str) -> Option<&OpNode> {
        self.by_digest
            .get(digest)
            .and_then(|&node| self.graph.node(node).ok())
    }

    /// Operations in execution order.
    pub fn ops(&self) -> impl Iterator<Item = &OpNode> {
        self.order
            .iter()
            .filter_map(|&node| self.graph.node(node).ok())
    }

    /// Every source the definition reads, in execution order.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.ops().filter_map(|node| match &node.op {
            Op::Source { source, .. } => Some(source),
            _ => None,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn graph(&self) -> &DAG<OpNode, usize> {
        &self.graph
    }

    /// Serialize the definition for the execution engine.
    ///
    /// # Errors
    ///
    /// Fails if an operation cannot be serialized.
    pub fn to_json(&self) -> LlbResult<String> {
        let document = DefinitionDocument {
            platform: &self.platform,
            root: self.root.as_ref(),
            ops: self.ops().collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

fn digest_of(op: &Op, inputs: &[Option<InputRef>]) -> LlbResult<String> {
    let bytes = serde_json::to_vec(&DigestInput { op, inputs })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::FileAction;
    use crate::state::MountOptions;

    fn amd64() -> Platform {
        Platform::linux("amd64")
    }

    #[test]
    fn test_scratch_marshals_to_empty_definition() {
        let definition = Definition::marshal(&State::scratch(), &amd64()).unwrap();
        assert!(definition.is_empty());
        assert!(definition.root().is_none());
    }

    #[test]
    fn test_image_reference_is_normalized_and_pinned() {
        let definition =
            Definition::marshal(&State::image("harbor.nbfc.io/foo"), &amd64()).unwrap();
        let sources: Vec<_> = definition.sources().collect();
        assert_eq!(sources.len(), 1);
        assert_eq!(
            sources[0].identifier(),
            "docker-image://harbor.nbfc.io/foo:latest"
        );
        assert_eq!(
            sources[0],
            &Source::Image {
                reference: "harbor.nbfc.io/foo:latest".to_string(),
                platform: Some(amd64()),
            }
        );
    }

    #[test]
    fn test_invalid_reference_fails() {
        assert!(Definition::marshal(&State::image("/foo"), &amd64()).is_err());
    }

    #[test]
    fn test_identical_sources_are_deduplicated() {
        let base = State::image("alpine");
        let state = base.copy(&State::image("alpine"), "/a", "/b");
        let definition = Definition::marshal(&state, &amd64()).unwrap();

        assert_eq!(definition.len(), 2);
        assert_eq!(definition.edge_count(), 2);
        let root = definition.root_op().unwrap();
        assert_eq!(root.inputs[0], root.inputs[1]);
    }

    #[test]
    fn test_marshal_is_idempotent() {
        let build = || {
            let content = State::scratch().copy(&State::local("context"), "a", "b");
            State::image("tools")
                .mkdir("/tmp", 0o755)
                .dir("/workdir")
                .run(["sh", "-c", "ls"])
                .mount("/workdir", &content, MountOptions {
                    readonly: true,
                    selector: None,
                })
                .build()
                .root()
        };

        let first = Definition::marshal(&build(), &amd64()).unwrap();
        let second = Definition::marshal(&build(), &amd64()).unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first.graph().edges(), second.graph().edges());
        assert_eq!(first.root(), second.root());
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_ops_are_in_execution_order() {
        let state = State::scratch()
            .mkdir("/.boot", 0o755)
            .copy(&State::local("context"), "kernel", "/.boot/kernel");
        let definition = Definition::marshal(&state, &amd64()).unwrap();

        let ops: Vec<_> = definition.ops().collect();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0].op, Op::File(FileAction::Mkdir { .. })));
        assert!(matches!(ops[1].op, Op::Source { .. }));
        assert!(matches!(ops[2].op, Op::File(FileAction::Copy { .. })));
        assert_eq!(ops[0].inputs, vec![None]);
        assert_eq!(definition.root().unwrap().digest, ops[2].digest);
    }
}
