use ndarray::ArrayD;

use crate::{ModelErr, Result};

/// Output label conventions and matching helpers.
pub mod label {
    pub const COST: &str = "cost";
    pub const ERROR: &str = "error";
    pub const GPARAM: &str = "gparam";
    pub const GRADIENT_NORM: &str = "gradient_norm";
    pub const CTC_PRIORS: &str = "ctc_priors";

    pub fn cost(name: &str) -> String {
        format!("{COST}:{name}")
    }

    pub fn error(name: &str) -> String {
        format!("{ERROR}:{name}")
    }

    pub fn gparam(name: &str) -> String {
        format!("{GPARAM}:{name}")
    }

    /// Whether `label` belongs to `class`, either exactly or as a
    /// `"<class>:<name>"` labelled value.
    pub fn matches_class(label: &str, class: &str) -> bool {
        label == class
            || (label.len() > class.len()
                && label.starts_with(class)
                && label.as_bytes()[class.len()] == b':')
    }
}

/// One task's results: an ordered value list with an optional positional
/// label list. Only train and eval results carry labels.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub values: Vec<ArrayD<f32>>,
    pub labels: Option<Vec<String>>,
}

impl OutputRecord {
    /// Creates a record, enforcing positional label correspondence.
    pub fn new(values: Vec<ArrayD<f32>>, labels: Option<Vec<String>>) -> Result<Self> {
        if let Some(labels) = &labels {
            if labels.len() != values.len() {
                return Err(ModelErr::OutputLengthMismatch {
                    values: values.len(),
                    labels: labels.len(),
                });
            }
        }
        Ok(Self { values, labels })
    }

    /// Zips labels to values, when labels exist.
    pub fn result_map(&self) -> Option<Vec<(&str, &ArrayD<f32>)>> {
        let labels = self.labels.as_ref()?;
        Some(
            labels
                .iter()
                .map(String::as_str)
                .zip(self.values.iter())
                .collect(),
        )
    }

    /// Looks up a single labelled value.
    pub fn value(&self, label: &str) -> Option<&ArrayD<f32>> {
        let labels = self.labels.as_ref()?;
        let idx = labels.iter().position(|l| l == label)?;
        self.values.get(idx)
    }
}
