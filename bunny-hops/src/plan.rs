//! The packaging plan handed to graph materialization.

use bunny_llb::State;
use std::collections::BTreeMap;

/// Copy of one path of `state` into the final image.
#[derive(Debug, Clone)]
pub struct PackCopy {
    pub state: State,
    pub src: String,
    pub dst: String,
}

/// Image settings carried next to the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackConfig {
    /// Reference the base state was pulled from, `scratch` when synthesized
    pub base_ref: String,
    pub monitor: String,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
}

/// Everything needed to assemble the final image.
#[derive(Debug, Clone)]
pub struct PackInstructions {
    pub base: State,
    /// Applied onto `base` in order
    pub copies: Vec<PackCopy>,
    pub annotations: BTreeMap<String, String>,
    pub config: PackConfig,
}

impl Default for PackInstructions {
    fn default() -> Self {
        Self {
            base: State::scratch(),
            copies: Vec::new(),
            annotations: BTreeMap::new(),
            config: PackConfig {
                base_ref: "scratch".to_string(),
                ..PackConfig::default()
            },
        }
    }
}
