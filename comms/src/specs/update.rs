use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which update rule drives the optimizer inside the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRule {
    /// The globally configured rule of the model compiler.
    Global,
    /// No optimizer; train tasks emit per-parameter gradients instead.
    None,
    /// A named rule with `update_params` as its settings.
    Custom(String),
}

/// Per-device update configuration.
///
/// Immutable once a device is initialized for a task; replaced wholesale
/// on reinitialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSpec {
    pub update_rule: UpdateRule,
    pub update_params: BTreeMap<String, f64>,
    /// When non-empty, restricts updates to parameters of these layers.
    pub layers: Vec<String>,
    /// Batch block size for block-wise execution; 0 means whole batch.
    pub block_size: usize,
}

impl Default for UpdateSpec {
    fn default() -> Self {
        Self {
            update_rule: UpdateRule::Global,
            update_params: BTreeMap::new(),
            layers: Vec::new(),
            block_size: 0,
        }
    }
}

/// How decoded parameter blobs are validated against the receiver's
/// current parameters.
///
/// `CountOnly` tolerates benign structural reshapes as long as element
/// counts match; `Strict` additionally requires full shape equality with
/// the shapes transmitted alongside the blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeCheck {
    Strict,
    CountOnly,
}

impl Default for ShapeCheck {
    fn default() -> Self {
        Self::Strict
    }
}
