use std::{error::Error, fmt};

/// Parameter and output handling failures.
#[derive(Debug)]
pub enum ModelErr {
    BlobCountMismatch {
        got: usize,
        expected: usize,
    },
    ElementCountMismatch {
        name: String,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A raw blob whose byte length is not a whole number of elements.
    RaggedBlob {
        name: String,
        len: usize,
    },
    OutputLengthMismatch {
        values: usize,
        labels: usize,
    },
    DuplicateParam {
        name: String,
    },
}

impl fmt::Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelErr::BlobCountMismatch { got, expected } => {
                write!(f, "parameter blob count mismatch: got {got}, expected {expected}")
            }
            ModelErr::ElementCountMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "element count mismatch for parameter {name}: got {got}, expected {expected}"
            ),
            ModelErr::ShapeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for parameter {name}: got {got:?}, expected {expected:?}"
            ),
            ModelErr::RaggedBlob { name, len } => {
                write!(f, "blob for {name} has ragged byte length {len}")
            }
            ModelErr::OutputLengthMismatch { values, labels } => write!(
                f,
                "output record with {values} values but {labels} labels"
            ),
            ModelErr::DuplicateParam { name } => {
                write!(f, "duplicate parameter name {name}")
            }
        }
    }
}

impl Error for ModelErr {}
