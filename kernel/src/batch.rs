use comms::specs::{BatchDescriptor, TargetDescriptor};
use ndarray::{ArrayD, IxDyn};

use crate::{KernelErr, Result};

/// One auxiliary target buffer with its validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetBatch {
    pub key: String,
    pub values: ArrayD<f32>,
    pub mask: ArrayD<u8>,
}

/// The allocated numeric storage behind a `BatchDescriptor`.
///
/// Buffers are zero-filled on allocation and refilled in place between
/// steps. Ownership is exclusive to one side of the channel; crossing it
/// always copies.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBatch {
    pub input: ArrayD<f32>,
    pub input_mask: ArrayD<u8>,
    pub targets: Vec<TargetBatch>,
    pub tags: Vec<String>,
    /// Bounded auxiliary target buffer, `slots x aux_len`.
    pub aux_targets: Option<ArrayD<f32>>,
}

impl DeviceBatch {
    /// Allocates zero-filled storage for `desc`.
    ///
    /// The input shape must be a positive `time x batch x feature`
    /// triple; target shapes may contain zeros (unknown at forwarding
    /// time). Tags must cover every batch slot.
    pub fn alloc(desc: &BatchDescriptor) -> Result<Self> {
        if desc.input_shape.len() != 3 || desc.input_shape.iter().any(|&s| s == 0) {
            return Err(KernelErr::InvalidBatchShape {
                shape: desc.input_shape.clone(),
            });
        }

        let slots = desc.num_slots();
        if desc.tags.len() != slots {
            return Err(KernelErr::TagCountMismatch {
                got: desc.tags.len(),
                expected: slots,
            });
        }

        let mut targets: Vec<TargetBatch> = Vec::with_capacity(desc.targets.len());
        for TargetDescriptor { key, shape } in &desc.targets {
            if targets.iter().any(|t| &t.key == key) {
                return Err(KernelErr::DuplicateDataKey { key: key.clone() });
            }
            targets.push(TargetBatch {
                key: key.clone(),
                values: ArrayD::zeros(IxDyn(shape)),
                mask: ArrayD::zeros(IxDyn(&BatchDescriptor::mask_shape(shape))),
            });
        }

        Ok(Self {
            input: ArrayD::zeros(IxDyn(&desc.input_shape)),
            input_mask: ArrayD::zeros(IxDyn(&BatchDescriptor::mask_shape(
                &desc.input_shape,
            ))),
            targets,
            tags: desc.tags.clone(),
            aux_targets: desc
                .aux_len
                .map(|len| ArrayD::zeros(IxDyn(&[slots, len]))),
        })
    }

    /// Number of batch slots (the batch axis of the input).
    pub fn num_slots(&self) -> usize {
        self.input.shape().get(1).copied().unwrap_or(0)
    }

    /// Rebuilds the wire descriptor for this storage.
    pub fn descriptor(&self) -> BatchDescriptor {
        BatchDescriptor {
            input_shape: self.input.shape().to_vec(),
            targets: self
                .targets
                .iter()
                .map(|t| TargetDescriptor {
                    key: t.key.clone(),
                    shape: t.values.shape().to_vec(),
                })
                .collect(),
            tags: self.tags.clone(),
            aux_len: self.aux_targets.as_ref().map(|a| a.shape()[1]),
        }
    }

    pub fn target(&self, key: &str) -> Option<&TargetBatch> {
        self.targets.iter().find(|t| t.key == key)
    }

    pub fn target_mut(&mut self, key: &str) -> Option<&mut TargetBatch> {
        self.targets.iter_mut().find(|t| t.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> BatchDescriptor {
        BatchDescriptor {
            input_shape: vec![7, 3, 5],
            targets: vec![TargetDescriptor {
                key: "classes".to_string(),
                shape: vec![7, 3],
            }],
            tags: vec!["a".into(), "b".into(), "c".into()],
            aux_len: Some(11),
        }
    }

    #[test]
    fn alloc_shapes_follow_descriptor() {
        let batch = DeviceBatch::alloc(&desc()).unwrap();
        assert_eq!(batch.input.shape(), &[7, 3, 5]);
        assert_eq!(batch.input_mask.shape(), &[7, 3]);
        assert_eq!(batch.target("classes").unwrap().mask.shape(), &[7, 3]);
        assert_eq!(batch.aux_targets.as_ref().unwrap().shape(), &[3, 11]);
        assert_eq!(batch.num_slots(), 3);
        assert_eq!(batch.descriptor(), desc());
    }

    #[test]
    fn alloc_rejects_zero_input_dims() {
        let mut d = desc();
        d.input_shape = vec![7, 0, 5];
        d.tags.clear();
        assert!(matches!(
            DeviceBatch::alloc(&d),
            Err(KernelErr::InvalidBatchShape { .. })
        ));
    }

    #[test]
    fn alloc_rejects_tag_mismatch() {
        let mut d = desc();
        d.tags.pop();
        assert!(matches!(
            DeviceBatch::alloc(&d),
            Err(KernelErr::TagCountMismatch {
                got: 2,
                expected: 3
            })
        ));
    }
}
