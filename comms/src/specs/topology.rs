use serde::{Deserialize, Serialize};

/// A JSON-like structural description of a network topology.
///
/// The device coordination layer treats it as opaque; it only needs
/// structural equality to decide whether a reinit must rebuild kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec(pub serde_json::Value);

impl TopologySpec {
    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Structural difference check (not textual).
    pub fn differs(&self, other: &TopologySpec) -> bool {
        self.0 != other.0
    }
}

/// Explicit declaration of which parameters are trainable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainParamSelection {
    /// Layer names whose parameters train; empty means all layers.
    pub layers: Vec<String>,
    /// Individual parameter names; empty means all of the layer set.
    pub params: Vec<String>,
}
