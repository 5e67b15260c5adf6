use std::{error::Error, fmt};

use comms::specs::TaskKind;
use model::ModelErr;

use crate::ComputeFault;

/// Failures of the device compute core.
#[derive(Debug)]
pub enum KernelErr {
    Compute(ComputeFault),
    Compile {
        detail: String,
    },
    /// A task produced no output; the kernel contract requires at least
    /// one value.
    EmptyOutput {
        task: TaskKind,
    },
    BlockCountMismatch {
        got: usize,
        expected: usize,
    },
    BlockShapeMismatch {
        index: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    UnsupportedTask {
        task: TaskKind,
    },
    NoBatch {
        task: TaskKind,
    },
    InvalidBatchShape {
        shape: Vec<usize>,
    },
    TagCountMismatch {
        got: usize,
        expected: usize,
    },
    DuplicateDataKey {
        key: String,
    },
    UnknownDataKey {
        key: String,
    },
    MissingDataKey {
        key: String,
    },
    ParamCountMismatch {
        got: usize,
        expected: usize,
    },
    Model(ModelErr),
}

impl KernelErr {
    /// Whether the worker loop may keep serving after this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KernelErr::Compute(ComputeFault::Recoverable(_)))
    }
}

impl fmt::Display for KernelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelErr::Compute(fault) => write!(f, "compute fault: {fault}"),
            KernelErr::Compile { detail } => write!(f, "kernel compilation failed: {detail}"),
            KernelErr::EmptyOutput { task } => {
                write!(f, "task {task} produced an empty output list")
            }
            KernelErr::BlockCountMismatch { got, expected } => write!(
                f,
                "block output count changed between blocks: got {got}, expected {expected}"
            ),
            KernelErr::BlockShapeMismatch {
                index,
                got,
                expected,
            } => write!(
                f,
                "block output {index} changed shape between blocks: got {got:?}, expected {expected:?}"
            ),
            KernelErr::UnsupportedTask { task } => {
                write!(f, "net has no kernel for task {task}")
            }
            KernelErr::NoBatch { task } => {
                write!(f, "task {task} requires a batch but none is loaded")
            }
            KernelErr::InvalidBatchShape { shape } => {
                write!(f, "invalid batch input shape {shape:?}")
            }
            KernelErr::TagCountMismatch { got, expected } => {
                write!(f, "tag count mismatch: got {got}, expected {expected} slots")
            }
            KernelErr::DuplicateDataKey { key } => write!(f, "duplicate data key {key}"),
            KernelErr::UnknownDataKey { key } => {
                write!(f, "data key {key} is not used by the compiled net")
            }
            KernelErr::MissingDataKey { key } => {
                write!(f, "batch is missing used data key {key}")
            }
            KernelErr::ParamCountMismatch { got, expected } => {
                write!(f, "parameter count mismatch: got {got}, expected {expected}")
            }
            KernelErr::Model(e) => write!(f, "parameter codec error: {e}"),
        }
    }
}

impl Error for KernelErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KernelErr::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelErr> for KernelErr {
    fn from(value: ModelErr) -> Self {
        Self::Model(value)
    }
}

impl From<ComputeFault> for KernelErr {
    fn from(value: ComputeFault) -> Self {
        Self::Compute(value)
    }
}
