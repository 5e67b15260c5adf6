use ndarray::ArrayD;

use crate::{ModelErr, Result};

/// One named tensor of a network's trainable state.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub values: ArrayD<f32>,
}

impl Param {
    pub fn new(name: impl Into<String>, values: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// The ordered collection of a network's numeric weights.
///
/// Order is part of the contract: the codec and the wire protocol address
/// parameters positionally, never by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Param>,
}

impl ParameterSet {
    /// Creates a parameter set, rejecting duplicate names.
    pub fn new(params: Vec<Param>) -> Result<Self> {
        for (i, param) in params.iter().enumerate() {
            if params[..i].iter().any(|p| p.name == param.name) {
                return Err(ModelErr::DuplicateParam {
                    name: param.name.clone(),
                });
            }
        }
        Ok(Self { params })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Param> {
        self.params.iter_mut()
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The shape of every tensor, in order.
    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.params
            .iter()
            .map(|p| p.values.shape().to_vec())
            .collect()
    }

    /// Total element count over all tensors.
    pub fn total_len(&self) -> usize {
        self.params.iter().map(|p| p.values.len()).sum()
    }
}

impl IntoIterator for ParameterSet {
    type Item = Param;
    type IntoIter = std::vec::IntoIter<Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.into_iter()
    }
}
