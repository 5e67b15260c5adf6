use std::time::Instant;

use comms::specs::{ShapeCheck, TaskKind, TopologySpec, TrainParamSelection, UpdateSpec};
use log::info;
use model::{ParameterSet, codec};
use ndarray::ArrayD;

use crate::{DeviceBatch, DeviceMetrics, DeviceNet, KernelErr, ModelCompiler, Result, runner};

/// The device compute core shared by both execution modes.
///
/// A blocking handle drives one of these directly in the coordinator
/// process; a worker's command loop drives one inside the worker process.
/// Keeping the logic in one place means the two modes cannot diverge.
/// All batch metadata lives here and is passed by reference; there is no
/// ambient "current device" state anywhere.
pub struct LocalDevice {
    name: String,
    compiler: Box<dyn ModelCompiler>,
    net: Box<dyn DeviceNet>,
    task: TaskKind,
    topology: TopologySpec,
    train_params: Option<TrainParamSelection>,
    update: UpdateSpec,
    shape_check: ShapeCheck,
    batch: Option<DeviceBatch>,
    num_updates: u64,
    /// Codec snapshot filled by `sync_net_train_params`, served by
    /// `synced_params`.
    synced: Option<(Vec<Vec<usize>>, Vec<Vec<u8>>)>,
    metrics: DeviceMetrics,
}

impl LocalDevice {
    /// Compiles the initial net and readies the device core.
    ///
    /// # Arguments
    /// * `name` - Resolved device name, for diagnostics.
    /// * `compiler` - The model compiler collaborator.
    /// * `topology` - Initial network topology.
    /// * `task` - The task this device is configured for.
    /// * `update` - Update configuration; fixed until reinit.
    /// * `train_params` - Explicit trainable-parameter declaration.
    /// * `shape_check` - Parameter decode validation mode.
    pub fn initialize(
        name: String,
        mut compiler: Box<dyn ModelCompiler>,
        topology: TopologySpec,
        task: TaskKind,
        update: UpdateSpec,
        train_params: Option<TrainParamSelection>,
        shape_check: ShapeCheck,
    ) -> Result<Self> {
        let net = compiler.compile(&topology, task, &update, train_params.as_ref())?;
        Ok(Self {
            name,
            compiler,
            net,
            task,
            topology,
            train_params,
            update,
            shape_check,
            batch: None,
            num_updates: 0,
            synced: None,
            metrics: DeviceMetrics::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn train_param_count(&self) -> usize {
        self.net.train_param_count()
    }

    pub fn used_data_keys(&self) -> Vec<String> {
        self.net.used_data_keys()
    }

    pub fn wants_aux_targets(&self) -> bool {
        self.net.wants_aux_targets()
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    pub fn batch(&self) -> Option<&DeviceBatch> {
        self.batch.as_ref()
    }

    /// Whether a reinit with this topology/declaration must rebuild
    /// kernels.
    pub fn need_reinit(
        &self,
        topology: &TopologySpec,
        train_params: Option<&TrainParamSelection>,
    ) -> bool {
        if self.topology.differs(topology) {
            return true;
        }
        match train_params {
            Some(sel) => self.train_params.as_ref() != Some(sel),
            None => false,
        }
    }

    /// Rebuilds kernels when needed; always reports the trainable
    /// parameter count afterwards. Rebuilding can take a while since
    /// gradients have to be recomputed.
    pub fn reinit(
        &mut self,
        topology: TopologySpec,
        train_params: Option<TrainParamSelection>,
    ) -> Result<usize> {
        if self.need_reinit(&topology, train_params.as_ref()) {
            if self.topology.differs(&topology) {
                info!("device {}: reinit, network description differs", self.name);
            } else {
                info!("device {}: reinit, train param declaration differs", self.name);
            }
            let selection = train_params.clone().or_else(|| self.train_params.clone());
            self.net =
                self.compiler
                    .compile(&topology, self.task, &self.update, selection.as_ref())?;
            self.topology = topology;
            if train_params.is_some() {
                self.train_params = train_params;
            }
            self.synced = None;
        }
        Ok(self.net.train_param_count())
    }

    /// Copies a fresh batch into kernel-visible storage.
    ///
    /// The batch's target keys must exactly cover the net's used data
    /// keys; both sides of a channel agree on that set per reinit cycle.
    pub fn set_batch(&mut self, batch: DeviceBatch) -> Result<()> {
        let used = self.net.used_data_keys();
        for target in &batch.targets {
            if !used.contains(&target.key) {
                return Err(KernelErr::UnknownDataKey {
                    key: target.key.clone(),
                });
            }
        }
        for key in &used {
            if batch.target(key).is_none() {
                return Err(KernelErr::MissingDataKey { key: key.clone() });
            }
        }

        let started = Instant::now();
        self.net.load_batch(&batch)?;
        self.batch = Some(batch);
        self.metrics.add_update(started.elapsed());
        Ok(())
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        self.net.set_learning_rate(lr);
    }

    /// Epoch rollover: epoch-dependent kernel state plus the update
    /// counter start over.
    pub fn reset(&mut self, epoch: usize) {
        self.net.reset(epoch);
        self.num_updates = 0;
    }

    /// Overwrites all parameters from decoded wire blobs.
    pub fn set_net_params(&mut self, shapes: &[Vec<usize>], blobs: &[Vec<u8>]) -> Result<()> {
        let mut params = self.net.all_params();
        codec::decode_into(&mut params, blobs, shapes, self.shape_check)?;
        self.net.set_all_params(&params)
    }

    /// Overwrites all parameters from an in-process set (blocking mode).
    pub fn set_params(&mut self, params: &ParameterSet) -> Result<()> {
        self.net.set_all_params(params)
    }

    /// Snapshot of all parameters (the trainer copy).
    pub fn all_params(&self) -> ParameterSet {
        self.net.all_params()
    }

    /// Snapshots all parameters through the codec into the local cache.
    pub fn sync_net_train_params(&mut self) {
        let params = self.net.all_params();
        self.synced = Some((params.shapes(), codec::encode(&params)));
    }

    /// The cached codec snapshot; empty until the first sync.
    pub fn synced_params(&self) -> (&[Vec<usize>], &[Vec<u8>]) {
        match &self.synced {
            Some((shapes, blobs)) => (shapes, blobs),
            None => (&[], &[]),
        }
    }

    /// Runs a task through the batch runner against the bound kernel.
    ///
    /// # Returns
    /// The accumulated output values and, for tasks that report a
    /// format, the positional label list.
    pub fn run_task(&mut self, task: TaskKind) -> Result<(Vec<ArrayD<f32>>, Option<Vec<String>>)> {
        let batch_slots = match &self.batch {
            Some(batch) => batch.num_slots(),
            None if task.is_batched() => return Err(KernelErr::NoBatch { task }),
            None => 0,
        };
        let block_size = self.update.block_size;

        let started = Instant::now();
        let values = {
            let kernel = self.net.kernel(task)?;
            runner::run_task(kernel, task, batch_slots, block_size)?
        };
        self.metrics.add_compute(started.elapsed());

        if task == TaskKind::Train {
            self.num_updates += runner::num_blocks(batch_slots, block_size) as u64;
        }

        let labels = if task.has_labels() {
            self.net.output_labels(task)
        } else {
            None
        };
        Ok((values, labels))
    }

    pub fn start_epoch_stats(&mut self) {
        self.metrics.start_epoch();
    }

    pub fn finish_epoch_stats(&mut self) {
        let name = self.name.clone();
        self.metrics.finish_epoch(&name);
    }

    pub fn metrics(&self) -> &DeviceMetrics {
        &self.metrics
    }
}
