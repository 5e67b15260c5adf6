//! Model-broken detection and diagnostic dumps.
//!
//! Only the "small" outputs are checked: cost-class and
//! gradient-norm-class labels, never the full per-parameter gradients.
//! A non-finite value is a soft signal; nothing here aborts a task.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use kernel::DeviceBatch;
use model::{OutputRecord, label};
use ndarray::ArrayD;
use safetensors::tensor::{Dtype, TensorView};

/// What was non-finite, for the log, the dump metadata and the
/// inspection hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenInfo {
    pub detail: String,
}

const RELEVANT_CLASSES: [&str; 2] = [label::COST, label::GRADIENT_NORM];

/// Checks the relevant outputs of a labelled result for finiteness.
///
/// # Returns
/// `None` when every relevant value is finite or the record carries no
/// labels; otherwise a description of all relevant values.
pub fn check_broken(record: &OutputRecord) -> Option<BrokenInfo> {
    let map = record.result_map()?;
    let relevant: Vec<(&str, &ArrayD<f32>)> = map
        .into_iter()
        .filter(|(l, _)| RELEVANT_CLASSES.iter().any(|class| label::matches_class(l, class)))
        .collect();

    let broken = relevant
        .iter()
        .any(|(_, values)| values.iter().any(|v| !v.is_finite()));
    if !broken {
        return None;
    }

    let detail = relevant
        .iter()
        .map(|(l, values)| format_value(l, values))
        .collect::<Vec<_>>()
        .join(", ");
    Some(BrokenInfo { detail })
}

fn format_value(label: &str, values: &ArrayD<f32>) -> String {
    if values.len() == 1 {
        match values.iter().next() {
            Some(v) => format!("{label} = {v}"),
            None => format!("{label} = <empty>"),
        }
    } else {
        let non_finite = values.iter().filter(|v| !v.is_finite()).count();
        format!(
            "{label} = <{} values, {} non-finite>",
            values.len(),
            non_finite
        )
    }
}

/// Writes a uniquely-numbered snapshot of the staged batch and the
/// current parameter values next to the given directory.
///
/// # Returns
/// The path of the written dump file.
pub fn dump_broken(
    dir: &Path,
    batch: Option<&DeviceBatch>,
    params: &[(String, ArrayD<f32>)],
    info: &BrokenInfo,
) -> io::Result<PathBuf> {
    let path = unique_dump_path(dir)?;

    // safetensors views borrow raw bytes; materialize every buffer first.
    let mut buffers: Vec<(String, Vec<usize>, Dtype, Vec<u8>)> = Vec::new();

    if let Some(batch) = batch {
        buffers.push(float_entry("batch/input", &batch.input));
        buffers.push(mask_entry("batch/input_mask", &batch.input_mask));
        for target in &batch.targets {
            buffers.push(float_entry(
                &format!("batch/target:{}", target.key),
                &target.values,
            ));
            buffers.push(mask_entry(
                &format!("batch/mask:{}", target.key),
                &target.mask,
            ));
        }
        if let Some(aux) = &batch.aux_targets {
            buffers.push(float_entry("batch/aux_targets", aux));
        }
    }

    for (name, values) in params {
        buffers.push(float_entry(&format!("param/{name}"), values));
    }

    let views: Vec<(String, TensorView<'_>)> = buffers
        .iter()
        .map(|(name, shape, dtype, bytes)| {
            TensorView::new(*dtype, shape.clone(), bytes)
                .map(|view| (name.clone(), view))
                .map_err(|e| io::Error::other(format!("dump tensor {name}: {e:?}")))
        })
        .collect::<io::Result<_>>()?;

    let metadata = Some(HashMap::from([("info".to_string(), info.detail.clone())]));
    safetensors::serialize_to_file(views, &metadata, &path)
        .map_err(|e| io::Error::other(format!("dump write: {e:?}")))?;

    Ok(path)
}

fn float_entry(name: &str, values: &ArrayD<f32>) -> (String, Vec<usize>, Dtype, Vec<u8>) {
    (
        name.to_string(),
        values.shape().to_vec(),
        Dtype::F32,
        model::codec::blob_from_array(values),
    )
}

fn mask_entry(name: &str, values: &ArrayD<u8>) -> (String, Vec<usize>, Dtype, Vec<u8>) {
    (
        name.to_string(),
        values.shape().to_vec(),
        Dtype::U8,
        model::codec::blob_from_mask(values),
    )
}

const DUMP_STEM: &str = "model_broken_dump";

fn unique_dump_path(dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let first = dir.join(format!("{DUMP_STEM}.safetensors"));
    if !first.exists() {
        return Ok(first);
    }
    let mut i = 1;
    loop {
        let path = dir.join(format!("{DUMP_STEM}.{i}.safetensors"));
        if !path.exists() {
            return Ok(path);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr0;

    fn record(cost: f32) -> OutputRecord {
        OutputRecord::new(
            vec![arr0(cost).into_dyn(), arr0(0.5f32).into_dyn()],
            Some(vec![label::cost("classes"), label::GRADIENT_NORM.to_string()]),
        )
        .unwrap()
    }

    #[test]
    fn finite_outputs_are_healthy() {
        assert!(check_broken(&record(1.25)).is_none());
    }

    #[test]
    fn nan_cost_is_broken() {
        let info = check_broken(&record(f32::NAN)).unwrap();
        assert!(info.detail.contains("cost:classes"), "{}", info.detail);
        assert!(info.detail.contains("gradient_norm"), "{}", info.detail);
    }

    #[test]
    fn infinite_gradient_norm_is_broken() {
        let rec = OutputRecord::new(
            vec![arr0(0.0f32).into_dyn(), arr0(f32::INFINITY).into_dyn()],
            Some(vec![label::cost("classes"), label::GRADIENT_NORM.to_string()]),
        )
        .unwrap();
        assert!(check_broken(&rec).is_some());
    }

    #[test]
    fn unlabelled_records_are_never_broken() {
        let rec = OutputRecord::new(vec![arr0(f32::NAN).into_dyn()], None).unwrap();
        assert!(check_broken(&rec).is_none());
    }

    #[test]
    fn gparam_values_are_not_relevant() {
        let rec = OutputRecord::new(
            vec![arr0(f32::NAN).into_dyn(), arr0(1.0f32).into_dyn()],
            Some(vec![label::gparam("w"), label::cost("classes")]),
        )
        .unwrap();
        assert!(check_broken(&rec).is_none());
    }

    #[test]
    fn dump_files_number_uniquely() {
        let dir = tempfile::tempdir().unwrap();
        let info = BrokenInfo {
            detail: "cost:classes = NaN".to_string(),
        };
        let params = vec![(
            "w".to_string(),
            ndarray::ArrayD::zeros(ndarray::IxDyn(&[2, 2])),
        )];

        let first = dump_broken(dir.path(), None, &params, &info).unwrap();
        let second = dump_broken(dir.path(), None, &params, &info).unwrap();
        let third = dump_broken(dir.path(), None, &params, &info).unwrap();

        assert_eq!(first.file_name().unwrap(), "model_broken_dump.safetensors");
        assert_eq!(
            second.file_name().unwrap(),
            "model_broken_dump.1.safetensors"
        );
        assert_eq!(
            third.file_name().unwrap(),
            "model_broken_dump.2.safetensors"
        );
    }

    #[test]
    fn dump_is_readable_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let info = BrokenInfo {
            detail: "gradient_norm = inf".to_string(),
        };
        let params = vec![(
            "w".to_string(),
            ndarray::ArrayD::from_elem(ndarray::IxDyn(&[3]), 0.25f32),
        )];

        let path = dump_broken(dir.path(), None, &params, &info).unwrap();
        let raw = std::fs::read(&path).unwrap();
        let tensors = safetensors::SafeTensors::deserialize(&raw).unwrap();
        let view = tensors.tensor("param/w").unwrap();
        assert_eq!(view.shape(), &[3]);
        assert_eq!(view.dtype(), Dtype::F32);
    }
}
