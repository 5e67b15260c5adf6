use serde::{Deserialize, Serialize};

/// Shape of one auxiliary target buffer, keyed by data key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub key: String,
    pub shape: Vec<usize>,
}

/// Describes the numeric buffers of the current batch.
///
/// The main input is `time x batch x feature`; every target key carries
/// its own shape plus an implied validity mask over the first (up to) two
/// axes of that shape. `tags` carries one identifier per batch slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub input_shape: Vec<usize>,
    pub targets: Vec<TargetDescriptor>,
    pub tags: Vec<String>,
    /// Per-slot length of the bounded auxiliary target buffer, when the
    /// loss consumes one.
    pub aux_len: Option<usize>,
}

impl BatchDescriptor {
    /// Number of batch slots, taken from the batch axis of the input.
    pub fn num_slots(&self) -> usize {
        self.input_shape.get(1).copied().unwrap_or(0)
    }

    /// Shape of the validity mask for a buffer of `shape`: its first two
    /// axes (or fewer, for lower-rank buffers).
    pub fn mask_shape(shape: &[usize]) -> Vec<usize> {
        shape[..shape.len().min(2)].to_vec()
    }

    /// The ordered target keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.key.as_str())
    }
}
