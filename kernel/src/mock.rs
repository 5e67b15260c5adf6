//! A deterministic affine net for harness tests and wiring checks.
//!
//! The "model" reduces every batch slot to the masked sum of its input
//! features; costs are linear in those sums, so block-wise accumulation
//! is exactly checkable. Real kernels come from an embedder's compiler.

use comms::specs::{TaskKind, TopologySpec, TrainParamSelection, UpdateSpec};
use model::{Param, ParameterSet, label};
use ndarray::{ArrayD, IxDyn, arr0};

use crate::{
    ComputeFault, ComputeKernel, DeviceBatch, DeviceNet, KernelErr, ModelCompiler, Result,
};

/// Builds `MockNet`s from a topology of the form
/// `{"params": [{"name": .., "shape": [..]}, ..], "loss": ".."}`.
pub struct MockCompiler;

impl ModelCompiler for MockCompiler {
    fn compile(
        &mut self,
        topology: &TopologySpec,
        _task: TaskKind,
        _update: &UpdateSpec,
        train_params: Option<&TrainParamSelection>,
    ) -> Result<Box<dyn DeviceNet>> {
        let spec: MockTopology = serde_json::from_value(topology.0.clone())
            .map_err(|e| KernelErr::Compile {
                detail: e.to_string(),
            })?;

        let params: Vec<Param> = spec
            .params
            .iter()
            .map(|p| Param::new(&p.name, ArrayD::zeros(IxDyn(&p.shape))))
            .collect();
        let trainer = ParameterSet::new(params).map_err(|e| KernelErr::Compile {
            detail: e.to_string(),
        })?;

        let train_count = match train_params {
            Some(sel) if !sel.params.is_empty() => sel.params.len().min(trainer.len()),
            _ => trainer.len(),
        };

        Ok(Box::new(MockNet {
            trainer: trainer.clone(),
            evaluator: trainer,
            train_count,
            wants_aux: spec.loss.as_deref() == Some("ctc"),
            kernel: MockKernel::default(),
            epoch: 0,
            lr: 0.0,
        }))
    }
}

#[derive(serde::Deserialize)]
struct MockTopology {
    params: Vec<MockParam>,
    #[serde(default)]
    loss: Option<String>,
}

#[derive(serde::Deserialize)]
struct MockParam {
    name: String,
    shape: Vec<usize>,
}

/// Batch tag that makes the next task fail with a recoverable fault.
pub const FAULT_RECOVERABLE_TAG: &str = "fault:recoverable";
/// Batch tag that makes the next task fail with a resource fault.
pub const FAULT_RESOURCE_TAG: &str = "fault:resource";

/// Shared state of every mock kernel: per-slot masked input sums and the
/// per-slot target sums of the first used data key.
#[derive(Debug, Default, Clone)]
pub struct MockKernel {
    slot_sums: Vec<f32>,
    target_sums: Vec<f32>,
    weight_sum: f32,
    /// Optimizer steps taken since the last reset.
    pub steps: u64,
    mode: KernelMode,
    fault: Option<InjectedFault>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum InjectedFault {
    Recoverable,
    Resource,
}

impl MockKernel {
    fn injected(&self) -> std::result::Result<(), ComputeFault> {
        match self.fault {
            Some(InjectedFault::Recoverable) => Err(ComputeFault::Recoverable(
                "injected runtime fault".to_string(),
            )),
            Some(InjectedFault::Resource) => Err(ComputeFault::Resource(
                "injected allocation failure".to_string(),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum KernelMode {
    #[default]
    Train,
    Eval,
    Forward,
    Classify,
    Analyze,
}

impl MockKernel {
    fn block_cost(&self, start: usize, end: usize) -> f32 {
        self.slot_sums[start..end]
            .iter()
            .zip(&self.target_sums[start..end])
            .map(|(v, t)| (self.weight_sum + 1.0) * v - t)
            .sum()
    }
}

impl ComputeKernel for MockKernel {
    fn run_block(
        &mut self,
        start: usize,
        end: usize,
    ) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
        self.injected()?;
        if end > self.slot_sums.len() {
            return Err(ComputeFault::Recoverable(format!(
                "block [{start}, {end}) outside batch of {}",
                self.slot_sums.len()
            )));
        }
        let cost = self.block_cost(start, end);
        match self.mode {
            KernelMode::Train => {
                self.steps += 1;
                Ok(vec![
                    arr0(cost).into_dyn(),
                    arr0(self.weight_sum.abs()).into_dyn(),
                ])
            }
            KernelMode::Eval => Ok(vec![
                arr0(cost).into_dyn(),
                arr0((end - start) as f32).into_dyn(),
            ]),
            _ => Ok(vec![arr0(cost).into_dyn()]),
        }
    }

    fn run(&mut self) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
        self.injected()?;
        let values = match self.mode {
            KernelMode::Classify => self
                .slot_sums
                .iter()
                .map(|v| if *v > 0.0 { 1.0 } else { 0.0 })
                .collect(),
            _ => self.slot_sums.clone(),
        };
        let len = values.len();
        Ok(vec![
            ArrayD::from_shape_vec(IxDyn(&[len]), values)
                .map_err(|e| ComputeFault::Recoverable(e.to_string()))?,
        ])
    }
}

/// The compiled mock net: two parameter copies around one kernel state.
pub struct MockNet {
    trainer: ParameterSet,
    evaluator: ParameterSet,
    train_count: usize,
    wants_aux: bool,
    kernel: MockKernel,
    pub epoch: usize,
    pub lr: f32,
}

impl DeviceNet for MockNet {
    fn train_param_count(&self) -> usize {
        self.train_count
    }

    fn used_data_keys(&self) -> Vec<String> {
        vec!["classes".to_string()]
    }

    fn wants_aux_targets(&self) -> bool {
        self.wants_aux
    }

    fn all_params(&self) -> ParameterSet {
        self.trainer.clone()
    }

    fn set_all_params(&mut self, params: &ParameterSet) -> Result<()> {
        if params.len() != self.trainer.len() {
            return Err(KernelErr::ParamCountMismatch {
                got: params.len(),
                expected: self.trainer.len(),
            });
        }
        self.trainer = params.clone();
        self.evaluator = params.clone();
        self.kernel.weight_sum = params
            .iter()
            .flat_map(|p| p.values.iter())
            .sum();
        Ok(())
    }

    fn load_batch(&mut self, batch: &DeviceBatch) -> Result<()> {
        let slots = batch.num_slots();
        let mut slot_sums = vec![0.0; slots];
        for (idx, lane) in batch.input.axis_iter(ndarray::Axis(1)).enumerate() {
            let masked: f32 = lane
                .outer_iter()
                .enumerate()
                .map(|(t, feat)| {
                    let valid = batch.input_mask[[t, idx]] as f32;
                    valid * feat.sum()
                })
                .sum();
            slot_sums[idx] = masked;
        }

        let mut target_sums = vec![0.0; slots];
        if let Some(target) = batch.target("classes") {
            for (idx, lane) in target.values.axis_iter(ndarray::Axis(1)).enumerate() {
                if idx < slots {
                    target_sums[idx] = lane.sum();
                }
            }
        }

        self.kernel.slot_sums = slot_sums;
        self.kernel.target_sums = target_sums;
        self.kernel.fault = batch.tags.iter().find_map(|tag| match tag.as_str() {
            FAULT_RECOVERABLE_TAG => Some(InjectedFault::Recoverable),
            FAULT_RESOURCE_TAG => Some(InjectedFault::Resource),
            _ => None,
        });
        Ok(())
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn reset(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.kernel.steps = 0;
    }

    fn output_labels(&self, task: TaskKind) -> Option<Vec<String>> {
        match task {
            TaskKind::Train => Some(vec![
                label::cost("classes"),
                label::GRADIENT_NORM.to_string(),
            ]),
            TaskKind::Eval => Some(vec![label::cost("classes"), label::error("classes")]),
            _ => None,
        }
    }

    fn kernel(&mut self, task: TaskKind) -> Result<&mut dyn ComputeKernel> {
        self.kernel.mode = match task {
            TaskKind::Train | TaskKind::GraphEval => KernelMode::Train,
            TaskKind::Eval => KernelMode::Eval,
            TaskKind::Forward => KernelMode::Forward,
            TaskKind::Classify => KernelMode::Classify,
            TaskKind::Analyze => KernelMode::Analyze,
        };
        Ok(&mut self.kernel)
    }
}

/// A topology document for `MockCompiler` with the given parameters.
pub fn mock_topology(params: &[(&str, &[usize])]) -> TopologySpec {
    let params: Vec<serde_json::Value> = params
        .iter()
        .map(|(name, shape)| serde_json::json!({ "name": name, "shape": shape }))
        .collect();
    TopologySpec::from_value(serde_json::json!({ "params": params }))
}
