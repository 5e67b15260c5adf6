//! Collaborator interfaces: the pre-compiled compute kernels and the
//! model compiler that builds them. The coordination layer never looks
//! inside either; it only drives them.

use std::fmt;

use comms::specs::{TaskKind, TopologySpec, TrainParamSelection, UpdateSpec};
use model::ParameterSet;
use ndarray::ArrayD;

use crate::{DeviceBatch, Result};

/// A fault raised by a compute kernel.
///
/// `Recoverable` faults leave the worker able to serve further commands;
/// `Resource` faults (out-of-memory class) do not, and terminate the
/// worker after being reported.
#[derive(Debug)]
pub enum ComputeFault {
    Recoverable(String),
    Resource(String),
}

impl fmt::Display for ComputeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeFault::Recoverable(detail) => write!(f, "recoverable: {detail}"),
            ComputeFault::Resource(detail) => write!(f, "resource exhaustion: {detail}"),
        }
    }
}

impl std::error::Error for ComputeFault {}

/// An externally supplied, pre-compiled compute function bound to one
/// task.
///
/// Batched kernels are invoked once per block with `[start, end)` bounds
/// over the batch dimension; non-batched kernels are invoked exactly once
/// with no bounds. Results are ordered lists of host-owned arrays.
pub trait ComputeKernel: Send {
    /// Runs one block of a batched task.
    fn run_block(&mut self, start: usize, end: usize)
    -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault>;

    /// Runs a non-batched task.
    fn run(&mut self) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault>;
}

/// A compiled network: kernels plus the trainer and evaluator parameter
/// copies behind them.
///
/// Both copies always receive the same values through
/// `set_all_params`; they are never aliased across the channel.
pub trait DeviceNet: Send {
    /// Number of trainable parameters under the current declaration.
    fn train_param_count(&self) -> usize;

    /// The auxiliary target keys this net consumes. Fixed per
    /// initialize/reinit cycle.
    fn used_data_keys(&self) -> Vec<String>;

    /// Whether the loss consumes the bounded auxiliary target buffer.
    fn wants_aux_targets(&self) -> bool;

    /// Snapshot of all parameters (the trainer copy), in declaration
    /// order.
    fn all_params(&self) -> ParameterSet;

    /// Overwrites all parameters of both the trainer and the evaluator
    /// copies.
    fn set_all_params(&mut self, params: &ParameterSet) -> Result<()>;

    /// Copies a batch into kernel-visible storage.
    fn load_batch(&mut self, batch: &DeviceBatch) -> Result<()>;

    /// Forwards a new learning rate to the optimizer, if one exists.
    fn set_learning_rate(&mut self, lr: f32);

    /// Epoch rollover: update epoch-dependent kernel state and reset the
    /// optimizer's step counter.
    fn reset(&mut self, epoch: usize);

    /// The positional output labels for a task, when that task reports a
    /// format (train/eval only).
    fn output_labels(&self, task: TaskKind) -> Option<Vec<String>>;

    /// The kernel serving a task.
    fn kernel(&mut self, task: TaskKind) -> Result<&mut dyn ComputeKernel>;
}

/// Builds compiled nets from topology documents.
///
/// Provided by the embedder; kernel construction, layer algorithms and
/// optimizer rules are entirely its concern.
pub trait ModelCompiler: Send {
    fn compile(
        &mut self,
        topology: &TopologySpec,
        task: TaskKind,
        update: &UpdateSpec,
        train_params: Option<&TrainParamSelection>,
    ) -> Result<Box<dyn DeviceNet>>;
}

/// Coordinator-side description of a network: what `prepare` pushes to a
/// device.
pub trait NetworkDescription {
    fn topology(&self) -> TopologySpec;
    fn all_params(&self) -> ParameterSet;
}
