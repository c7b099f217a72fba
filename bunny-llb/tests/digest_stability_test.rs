//! Digest stability across independently marshalled definitions
//!
//! The execution engine deduplicates work by op digest, so:
//! 1. Marshalling the same states twice must yield the same digests
//! 2. Changing an upstream op must change every downstream digest
//! 3. Unrelated siblings must keep their digests

use bunny_llb::{Definition, FileAction, Op, OpNode, Platform, State};
use std::collections::HashSet;

fn packaging_state(kernel_ref: &str) -> State {
    let kernel = State::image(kernel_ref);
    let tools =
        State::image("harbor.nbfc.io/nubificus/bunny/libarchive:latest").mkdir("/tmp", 0o755);
    State::scratch()
        .copy(&kernel, "/kernel", "/.boot/kernel")
        .copy(&tools, "/tmp", "/tmp")
}

fn marshal(state: &State) -> Definition {
    Definition::marshal(state, &Platform::linux("amd64")).unwrap()
}

fn digest_where(definition: &Definition, predicate: impl Fn(&OpNode) -> bool) -> String {
    definition
        .ops()
        .find(|node| predicate(node))
        .map(|node| node.digest.clone())
        .unwrap()
}

fn is_mkdir(node: &OpNode) -> bool {
    matches!(node.op, Op::File(FileAction::Mkdir { .. }))
}

fn is_kernel_copy(node: &OpNode) -> bool {
    matches!(&node.op, Op::File(FileAction::Copy { dest, .. }) if dest == "/.boot/kernel")
}

#[test]
fn test_rebuilt_definition_has_identical_digests() {
    let first = marshal(&packaging_state("harbor.nbfc.io/app:latest"));
    let second = marshal(&packaging_state("harbor.nbfc.io/app:latest"));

    let digests = |d: &Definition| d.ops().map(|n| n.digest.clone()).collect::<Vec<_>>();
    assert_eq!(first.len(), second.len());
    assert_eq!(first.graph().edges(), second.graph().edges());
    assert_eq!(digests(&first), digests(&second));
    assert_eq!(first.root(), second.root());
}

#[test]
fn test_upstream_change_propagates() {
    let first = marshal(&packaging_state("harbor.nbfc.io/app:v1"));
    let second = marshal(&packaging_state("harbor.nbfc.io/app:v2"));

    assert_ne!(
        digest_where(&first, is_kernel_copy),
        digest_where(&second, is_kernel_copy)
    );
    assert_ne!(first.root(), second.root());
    assert_eq!(digest_where(&first, is_mkdir), digest_where(&second, is_mkdir));
}

#[test]
fn test_inputs_precede_their_consumers() {
    let definition = marshal(&packaging_state("harbor.nbfc.io/app:latest"));

    let mut seen = HashSet::new();
    for node in definition.ops() {
        for input in node.inputs.iter().flatten() {
            assert!(seen.contains(&input.digest), "{} used before it exists", input.digest);
        }
        let _ = seen.insert(node.digest.clone());
    }
    assert_eq!(seen.len(), definition.len());
}
