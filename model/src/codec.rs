//! Parameter codec: tensors to and from raw byte blobs.
//!
//! Encoding preserves only the flattened native-endian f32 value stream.
//! Shape travels separately in the protocol headers; on decode the
//! receiver keeps its own tensor layout and validates against the
//! configured `ShapeCheck` mode.

use comms::specs::ShapeCheck;
use ndarray::{ArrayD, IxDyn};

use crate::{ModelErr, ParameterSet, Result};

const F32_SIZE: usize = size_of::<f32>();

/// Encodes every tensor into one raw blob, in order.
pub fn encode(params: &ParameterSet) -> Vec<Vec<u8>> {
    params.iter().map(|p| blob_from_array(&p.values)).collect()
}

/// Flattens one f32 tensor into its raw byte blob.
pub fn blob_from_array(values: &ArrayD<f32>) -> Vec<u8> {
    match values.as_slice() {
        Some(slice) => bytemuck::cast_slice(slice).to_vec(),
        None => {
            let owned: Vec<f32> = values.iter().copied().collect();
            bytemuck::cast_slice(&owned).to_vec()
        }
    }
}

/// Decodes raw blobs into an existing parameter set.
///
/// The blob count must equal the tensor count. Per tensor, the element
/// count must match the receiver's tensor; under `ShapeCheck::Strict`
/// the transmitted shape must additionally equal the receiver's shape.
/// Values are written in flat order into the receiver's own layout.
///
/// # Arguments
/// * `params` - The receiving parameter set, updated in place.
/// * `blobs` - One raw blob per tensor.
/// * `shapes` - The shapes transmitted alongside the blobs.
/// * `check` - Validation mode.
pub fn decode_into(
    params: &mut ParameterSet,
    blobs: &[Vec<u8>],
    shapes: &[Vec<usize>],
    check: ShapeCheck,
) -> Result<()> {
    if blobs.len() != params.len() || shapes.len() != params.len() {
        return Err(ModelErr::BlobCountMismatch {
            got: blobs.len().min(shapes.len()),
            expected: params.len(),
        });
    }

    for ((param, blob), shape) in params.iter_mut().zip(blobs).zip(shapes) {
        let values = floats_from_blob(&param.name, blob)?;

        if values.len() != param.values.len() {
            return Err(ModelErr::ElementCountMismatch {
                name: param.name.clone(),
                got: values.len(),
                expected: param.values.len(),
            });
        }

        if check == ShapeCheck::Strict && shape.as_slice() != param.values.shape() {
            return Err(ModelErr::ShapeMismatch {
                name: param.name.clone(),
                got: shape.clone(),
                expected: param.values.shape().to_vec(),
            });
        }

        for (dst, src) in param.values.iter_mut().zip(values) {
            *dst = src;
        }
    }

    Ok(())
}

/// Rebuilds one f32 tensor from a raw blob and its shape.
pub fn array_from_blob(name: &str, shape: &[usize], blob: &[u8]) -> Result<ArrayD<f32>> {
    let values = floats_from_blob(name, blob)?;
    let expected: usize = shape.iter().product();
    if values.len() != expected {
        return Err(ModelErr::ElementCountMismatch {
            name: name.to_string(),
            got: values.len(),
            expected,
        });
    }

    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| ModelErr::ElementCountMismatch {
        name: name.to_string(),
        got: blob.len() / F32_SIZE,
        expected,
    })
}

/// Rebuilds one u8 mask tensor from a raw blob and its shape.
pub fn mask_from_blob(name: &str, shape: &[usize], blob: &[u8]) -> Result<ArrayD<u8>> {
    let expected: usize = shape.iter().product();
    if blob.len() != expected {
        return Err(ModelErr::ElementCountMismatch {
            name: name.to_string(),
            got: blob.len(),
            expected,
        });
    }

    ArrayD::from_shape_vec(IxDyn(shape), blob.to_vec()).map_err(|_| {
        ModelErr::ElementCountMismatch {
            name: name.to_string(),
            got: blob.len(),
            expected,
        }
    })
}

/// Flattens one u8 mask tensor into its raw byte blob.
pub fn blob_from_mask(values: &ArrayD<u8>) -> Vec<u8> {
    match values.as_slice() {
        Some(slice) => slice.to_vec(),
        None => values.iter().copied().collect(),
    }
}

fn floats_from_blob(name: &str, blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % F32_SIZE != 0 {
        return Err(ModelErr::RaggedBlob {
            name: name.to_string(),
            len: blob.len(),
        });
    }
    // Copies into an aligned buffer; wire blobs have no alignment
    // guarantee.
    Ok(bytemuck::pod_collect_to_vec(blob))
}
