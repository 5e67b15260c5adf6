//! The coordinator-side device facade.
//!
//! A handle fixes its execution mode at construction: blocking mode
//! drives a `LocalDevice` in the calling process, process/thread mode
//! drives a worker over an exclusively owned channel. The orchestrator
//! is expected to `run()` every device before `result()`-ing any of
//! them, so their computation overlaps; `run()` never blocks on compute
//! in the remote modes.

use std::time::Duration;

use comms::{
    Channel, CommsErr, Frame,
    specs::{
        Command, DeviceKind, DeviceTag, ExecReply, RemoteCall, Reply, TaskKind, TopologySpec,
        TrainParamSelection, WORKER_SPEC_ENV, WorkerSpec,
    },
    transport::{self, WorkerLink},
};
use kernel::{DeviceBatch, LocalDevice, ModelCompiler, NetworkDescription};
use log::{debug, error, info, warn};
use model::{OutputRecord, ParameterSet, codec};
use ndarray::ArrayD;
use tokio::runtime::Runtime;

use crate::{
    DeviceAttributes, DeviceConfig, DeviceErr, Result, attributes,
    health::{self, BrokenInfo},
};

enum Mode {
    Blocking(Box<LocalDevice>),
    Remote {
        runtime: Runtime,
        chan: Channel,
        link: WorkerLink,
    },
}

/// Output staged by a blocking-mode `run()`: the task output, or `None`
/// after a recoverable compute fault.
type PendingOutput = Option<(Vec<ArrayD<f32>>, Option<Vec<String>>)>;

enum WaitOutcome {
    Record(OutputRecord),
    /// Worker reported an error or timed out; not necessarily dead.
    Sentinel { death: bool },
}

/// One coordination endpoint bound to one compute unit.
pub struct DeviceHandle {
    name: String,
    kind: DeviceKind,
    index: usize,
    attributes: DeviceAttributes,
    cfg: DeviceConfig,
    num_train_params: usize,
    used_data_keys: Vec<String>,
    run_called: u64,
    result_called: u64,
    staged: Option<DeviceBatch>,
    pending: Option<PendingOutput>,
    last_task: Option<TaskKind>,
    broken_hook: Option<Box<dyn FnMut(&BrokenInfo) + Send>>,
    dead: bool,
    mode: Mode,
}

impl DeviceHandle {
    /// Builds a blocking-mode handle executing in the calling process.
    ///
    /// # Arguments
    /// * `tag` - Device selector, e.g. `"cpu0"` or `"accelX"`.
    /// * `compiler` - The model compiler collaborator.
    /// * `cfg` - Device configuration.
    pub fn blocking(
        tag: &str,
        compiler: Box<dyn ModelCompiler>,
        cfg: DeviceConfig,
    ) -> Result<Self> {
        let tag = DeviceTag::parse(tag)?;
        let (index, name) = tag.resolve();

        let local = LocalDevice::initialize(
            name.clone(),
            compiler,
            cfg.topology.clone(),
            cfg.task,
            cfg.update.clone(),
            cfg.train_params.clone(),
            cfg.shape_check,
        )?;

        let attributes = attributes::lookup(&name);
        let num_train_params = local.train_param_count();
        let used_data_keys = local.used_data_keys();
        info!("device {name} initialized in blocking mode");

        Ok(Self {
            name,
            kind: tag.kind,
            index,
            attributes,
            cfg,
            num_train_params,
            used_data_keys,
            run_called: 0,
            result_called: 0,
            staged: None,
            pending: None,
            last_task: None,
            broken_hook: None,
            dead: false,
            mode: Mode::Blocking(Box::new(local)),
        })
    }

    /// Spawns a worker process and builds a process-mode handle.
    ///
    /// The worker executable (the embedder's own binary by default)
    /// receives the serialized worker spec through its environment and
    /// the channel on stdio. Channel death during the handshake aborts
    /// construction.
    pub fn spawn(tag: &str, cfg: DeviceConfig) -> Result<Self> {
        let tag = DeviceTag::parse(tag)?;
        let runtime = Runtime::new()?;

        let spec = WorkerSpec {
            device: tag,
            task: cfg.task,
            update: cfg.update.clone(),
            topology: cfg.topology.clone(),
            train_params: cfg.train_params.clone(),
            shape_check: cfg.shape_check,
        };
        let mut spawn = cfg.spawn.clone();
        spawn.envs.push((
            WORKER_SPEC_ENV.to_string(),
            spec.to_env_value().map_err(CommsErr::from)?,
        ));

        let (chan, link) = {
            let _guard = runtime.enter();
            transport::spawn_process(&spawn)?
        };

        Self::connect(runtime, chan, link, tag, cfg)
    }

    /// Runs the worker loop on a dedicated thread instead of a process
    /// and builds a handle for it.
    ///
    /// Same protocol, no process isolation; useful when the embedder
    /// cannot re-execute itself.
    pub fn spawn_threaded(
        tag: &str,
        compiler: Box<dyn ModelCompiler>,
        cfg: DeviceConfig,
    ) -> Result<Self> {
        let tag = DeviceTag::parse(tag)?;
        let runtime = Runtime::new()?;

        let spec = WorkerSpec {
            device: tag,
            task: cfg.task,
            update: cfg.update.clone(),
            topology: cfg.topology.clone(),
            train_params: cfg.train_params.clone(),
            shape_check: cfg.shape_check,
        };

        let (chan, link) = {
            let _guard = runtime.enter();
            transport::spawn_thread(&format!("device-{tag}"), move |rx, tx| async move {
                if let Err(e) = worker::serve(spec, compiler, rx, tx).await {
                    error!("thread worker exited with error: {e}");
                }
            })?
        };

        Self::connect(runtime, chan, link, tag, cfg)
    }

    /// Performs the handshake over an established channel and finishes
    /// handle construction.
    pub(crate) fn connect(
        runtime: Runtime,
        mut chan: Channel,
        link: WorkerLink,
        tag: DeviceTag,
        cfg: DeviceConfig,
    ) -> Result<Self> {
        let handshake = runtime.block_on(async {
            let resolved: Reply = chan.recv_control().await?;
            let Reply::DeviceResolved {
                device_id,
                device_name,
            } = resolved
            else {
                return Err(CommsErr::Protocol {
                    expected: "device-resolved reply",
                    got: format!("{resolved:?}"),
                });
            };
            let ready: Reply = chan.recv_control().await?;
            let Reply::Ready { num_train_params } = ready else {
                return Err(CommsErr::Protocol {
                    expected: "ready reply",
                    got: format!("{ready:?}"),
                });
            };
            Ok((device_id, device_name, num_train_params))
        });

        let (index, name, num_train_params) = match handshake {
            Ok(v) => v,
            Err(e) => {
                let mut link = link;
                runtime.block_on(link.kill());
                return Err(DeviceErr::Handshake {
                    detail: e.to_string(),
                });
            }
        };

        let mut handle = Self {
            attributes: attributes::lookup(&name),
            name,
            kind: tag.kind,
            index,
            cfg,
            num_train_params,
            used_data_keys: Vec::new(),
            run_called: 0,
            result_called: 0,
            staged: None,
            pending: None,
            last_task: None,
            broken_hook: None,
            dead: false,
            mode: Mode::Remote {
                runtime,
                chan,
                link,
            },
        };
        handle.sync_used_data_keys()?;
        info!(
            "device {} ready: {} trainable params",
            handle.name, handle.num_train_params
        );
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn attributes(&self) -> &DeviceAttributes {
        &self.attributes
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.mode, Mode::Blocking(_))
    }

    pub fn num_train_params(&self) -> usize {
        self.num_train_params
    }

    pub fn used_data_keys(&self) -> &[String] {
        &self.used_data_keys
    }

    pub fn run_called_count(&self) -> u64 {
        self.run_called
    }

    pub fn result_called_count(&self) -> u64 {
        self.result_called
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Installs the inspection hook invoked on a model-broken signal.
    pub fn set_broken_hook(&mut self, hook: Box<dyn FnMut(&BrokenInfo) + Send>) {
        self.broken_hook = Some(hook);
    }

    /// Readies a device for a task cycle: reinit to the network's
    /// topology, push all parameters, reset optimizer state for `epoch`.
    /// Must be called before any `run()`.
    pub fn prepare(
        &mut self,
        network: &dyn NetworkDescription,
        train_params: Option<TrainParamSelection>,
        epoch: usize,
    ) -> Result<()> {
        self.reinit(network.topology(), train_params)?;
        self.set_net_params(&network.all_params())?;
        self.reset(epoch)
    }

    /// Rebuilds worker kernels when the topology or train-parameter
    /// declaration differs; refreshes the used-data-keys agreement.
    pub fn reinit(
        &mut self,
        topology: TopologySpec,
        train_params: Option<TrainParamSelection>,
    ) -> Result<usize> {
        let num = match &mut self.mode {
            Mode::Blocking(local) => local.reinit(topology, train_params)?,
            Mode::Remote { runtime, chan, .. } => runtime.block_on(async {
                chan.send(&Command::Reinit {
                    topology,
                    train_params,
                })
                .await?;
                let reply: Reply = chan.recv_control().await?;
                match reply {
                    Reply::ReinitReady { num_train_params } => Ok(num_train_params),
                    other => Err(CommsErr::Protocol {
                        expected: "reinit-ready reply",
                        got: format!("{other:?}"),
                    }),
                }
            })?,
        };
        self.num_train_params = num;
        self.sync_used_data_keys()?;
        Ok(self.num_train_params)
    }

    /// Allocates (or replaces) the staged batch storage.
    ///
    /// The descriptor's target keys must match the agreed used data
    /// keys.
    pub fn alloc_batch(&mut self, desc: &comms::specs::BatchDescriptor) -> Result<()> {
        for key in desc.keys() {
            if !self.used_data_keys.iter().any(|k| k.as_str() == key) {
                return Err(DeviceErr::Kernel(kernel::KernelErr::UnknownDataKey {
                    key: key.to_string(),
                }));
            }
        }
        for key in &self.used_data_keys {
            if !desc.keys().any(|k| k == key.as_str()) {
                return Err(DeviceErr::Kernel(kernel::KernelErr::MissingDataKey {
                    key: key.clone(),
                }));
            }
        }
        self.staged = Some(DeviceBatch::alloc(desc)?);
        Ok(())
    }

    /// The staged batch, for filling between runs.
    pub fn batch_mut(&mut self) -> Option<&mut DeviceBatch> {
        self.staged.as_mut()
    }

    pub fn batch(&self) -> Option<&DeviceBatch> {
        self.staged.as_ref()
    }

    /// Pushes the staged batch and dispatches `task`.
    ///
    /// Never blocks on compute completion in the remote modes.
    pub fn run(&mut self, task: TaskKind) -> Result<()> {
        self.run_called += 1;
        self.last_task = Some(task);
        self.push_batch()?;

        match &mut self.mode {
            Mode::Blocking(local) => {
                self.pending = Some(match local.run_task(task) {
                    Ok(output) => Some(output),
                    Err(e) if e.is_recoverable() => {
                        warn!("device {}: runtime fault: {e}", self.name);
                        None
                    }
                    Err(e) => return Err(e.into()),
                });
            }
            Mode::Remote { runtime, chan, .. } => {
                runtime.block_on(chan.send(&Command::Task { task }))?;
            }
        }
        Ok(())
    }

    /// Collects the result of the oldest outstanding `run()`.
    ///
    /// Blocking mode returns immediately. Remote modes poll the channel
    /// once per `poll_interval` up to `result_timeout`; worker errors,
    /// channel death and timeout all surface as the `None` sentinel (the
    /// orchestrator decides whether to retry, drop the device or abort).
    /// A model-broken signal is a separate soft signal raised through
    /// the log, the dump file and the inspection hook; it does not
    /// suppress the record.
    pub fn result(&mut self) -> Result<Option<OutputRecord>> {
        if self.result_called >= self.run_called {
            return Err(DeviceErr::ResultWithoutRun {
                run_called: self.run_called,
                result_called: self.result_called,
            });
        }
        self.result_called += 1;

        let outcome = match &mut self.mode {
            Mode::Blocking(_) => match self.pending.take() {
                Some(Some((values, labels))) => {
                    WaitOutcome::Record(OutputRecord::new(values, labels)?)
                }
                Some(None) | None => WaitOutcome::Sentinel { death: false },
            },
            Mode::Remote {
                runtime,
                chan,
                link,
            } => {
                if self.dead {
                    debug!("device {} worker no longer alive", self.name);
                    return Ok(None);
                }
                let poll_interval = self.cfg.poll_interval;
                let result_timeout = self.cfg.result_timeout;
                let name = self.name.clone();
                runtime.block_on(wait_for_result(
                    chan,
                    link,
                    &name,
                    poll_interval,
                    result_timeout,
                ))?
            }
        };

        match outcome {
            WaitOutcome::Record(record) => {
                if self.last_task.is_some_and(TaskKind::has_labels) {
                    self.health_check(&record);
                }
                Ok(Some(record))
            }
            WaitOutcome::Sentinel { death } => {
                if death {
                    self.dead = true;
                }
                Ok(None)
            }
        }
    }

    /// Pushes all parameters to both worker-side copies.
    pub fn set_net_params(&mut self, params: &ParameterSet) -> Result<()> {
        match &mut self.mode {
            Mode::Blocking(local) => local.set_params(params)?,
            Mode::Remote { runtime, chan, .. } => runtime.block_on(async {
                let shapes = params.shapes();
                let blobs = codec::encode(params);
                chan.send(&Command::SetNetParams { shapes }).await?;
                for blob in &blobs {
                    chan.send_bytes(blob).await?;
                }
                chan.send(&Command::EndSetNetParams).await
            })?,
        }
        Ok(())
    }

    /// Snapshots the worker's parameters into its serving cache.
    pub fn sync_net_train_params(&mut self) -> Result<()> {
        match &mut self.mode {
            Mode::Blocking(local) => {
                local.sync_net_train_params();
                Ok(())
            }
            Mode::Remote { runtime, chan, .. } => {
                runtime.block_on(chan.send(&Command::SyncNetTrainParams))?;
                Ok(())
            }
        }
    }

    /// Pulls the last synced parameters, decoded against `network`'s
    /// own current shapes.
    pub fn get_net_train_params(
        &mut self,
        network: &dyn NetworkDescription,
    ) -> Result<ParameterSet> {
        match &mut self.mode {
            Mode::Blocking(local) => Ok(local.all_params()),
            Mode::Remote { runtime, chan, .. } => {
                let (shapes, blobs) = runtime.block_on(async {
                    chan.send(&Command::GetNetTrainParams).await?;
                    let reply: Reply = chan.recv_control().await?;
                    let Reply::NetTrainParams { shapes } = reply else {
                        return Err(CommsErr::Protocol {
                            expected: "net-train-params reply",
                            got: format!("{reply:?}"),
                        });
                    };
                    let mut blobs = Vec::with_capacity(shapes.len());
                    for _ in 0..shapes.len() {
                        blobs.push(chan.recv_bytes().await?);
                    }
                    let end: Reply = chan.recv_control().await?;
                    if end != Reply::EndNetTrainParams {
                        return Err(CommsErr::Protocol {
                            expected: "end-net-train-params reply",
                            got: format!("{end:?}"),
                        });
                    }
                    Ok((shapes, blobs))
                })?;

                let mut base = network.all_params();
                codec::decode_into(&mut base, &blobs, &shapes, self.cfg.shape_check)?;
                Ok(base)
            }
        }
    }

    pub fn set_learning_rate(&mut self, lr: f32) -> Result<()> {
        match &mut self.mode {
            Mode::Blocking(local) => {
                local.set_learning_rate(lr);
                Ok(())
            }
            Mode::Remote { runtime, chan, .. } => {
                runtime.block_on(chan.send(&Command::SetLearningRate { lr }))?;
                Ok(())
            }
        }
    }

    /// Epoch rollover on the worker; also clears its update counter.
    pub fn reset(&mut self, epoch: usize) -> Result<()> {
        match &mut self.mode {
            Mode::Blocking(local) => {
                local.reset(epoch);
                Ok(())
            }
            Mode::Remote { runtime, chan, .. } => {
                runtime.block_on(chan.send(&Command::Reset { epoch }))?;
                Ok(())
            }
        }
    }

    /// Number of optimizer updates since the last reset.
    pub fn num_updates(&mut self) -> Result<u64> {
        match &mut self.mode {
            Mode::Blocking(local) => Ok(local.num_updates()),
            Mode::Remote { runtime, chan, .. } => runtime.block_on(async {
                chan.send(&Command::GetNumUpdates).await?;
                let reply: Reply = chan.recv_control().await?;
                match reply {
                    Reply::NumUpdates { count } => Ok(count),
                    other => Err(CommsErr::Protocol {
                        expected: "num-updates reply",
                        got: format!("{other:?}"),
                    }
                    .into()),
                }
            }),
        }
    }

    pub fn start_epoch_stats(&mut self) -> Result<()> {
        self.exec_unit(RemoteCall::StartEpochStats)
    }

    pub fn finish_epoch_stats(&mut self) -> Result<()> {
        self.exec_unit(RemoteCall::FinishEpochStats)
    }

    /// Graceful stop, bounded join, then force kill. Idempotent.
    pub fn terminate(&mut self) {
        let grace = self.cfg.terminate_grace;
        let Mode::Remote {
            runtime,
            chan,
            link,
        } = &mut self.mode
        else {
            return;
        };

        if self.dead {
            link.kill_now();
            return;
        }

        runtime.block_on(async {
            if chan.send(&Command::Stop).await.is_ok() {
                let _ = tokio::time::timeout(grace, async {
                    loop {
                        match chan.recv().await {
                            Ok(Frame::Control(payload)) => {
                                if matches!(
                                    serde_json::from_slice::<Reply>(&payload),
                                    Ok(Reply::Done)
                                ) {
                                    break;
                                }
                            }
                            Ok(_) => continue,
                            Err(_) => break,
                        }
                    }
                })
                .await;
            }
            if !link.join(grace).await {
                warn!("worker did not stop within grace period, killing");
                link.kill().await;
            }
        });
        self.dead = true;
        debug!("device {} terminated", self.name);
    }

    fn exec_unit(&mut self, call: RemoteCall) -> Result<()> {
        match &mut self.mode {
            Mode::Blocking(local) => {
                match call {
                    RemoteCall::StartEpochStats => local.start_epoch_stats(),
                    RemoteCall::FinishEpochStats => local.finish_epoch_stats(),
                    RemoteCall::UsedDataKeys => {}
                }
                Ok(())
            }
            Mode::Remote { runtime, chan, .. } => runtime.block_on(async {
                chan.send(&Command::Exec(call)).await?;
                let reply: Reply = chan.recv_control().await?;
                match reply {
                    Reply::ExecResult(ExecReply::Unit) => Ok(()),
                    other => Err(CommsErr::Protocol {
                        expected: "unit exec result",
                        got: format!("{other:?}"),
                    }
                    .into()),
                }
            }),
        }
    }

    /// Refreshes the used-data-keys agreement from the worker.
    fn sync_used_data_keys(&mut self) -> Result<()> {
        let keys = match &mut self.mode {
            Mode::Blocking(local) => local.used_data_keys(),
            Mode::Remote { runtime, chan, .. } => runtime.block_on(async {
                chan.send(&Command::Exec(RemoteCall::UsedDataKeys)).await?;
                let reply: Reply = chan.recv_control().await?;
                match reply {
                    Reply::ExecResult(ExecReply::UsedDataKeys { keys }) => Ok(keys),
                    other => Err(CommsErr::Protocol {
                        expected: "used-data-keys exec result",
                        got: format!("{other:?}"),
                    }),
                }
            })?,
        };
        self.used_data_keys = keys;
        Ok(())
    }

    fn push_batch(&mut self) -> Result<()> {
        let Some(staged) = &self.staged else {
            return Err(DeviceErr::NoBatch);
        };

        match &mut self.mode {
            Mode::Blocking(local) => {
                local.set_batch(staged.clone())?;
            }
            Mode::Remote { runtime, chan, .. } => runtime.block_on(async {
                chan.send(&Command::UpdateData(staged.descriptor())).await?;
                chan.send_bytes(&codec::blob_from_array(&staged.input))
                    .await?;
                chan.send_bytes(&codec::blob_from_mask(&staged.input_mask))
                    .await?;
                for target in &staged.targets {
                    chan.send_bytes(&codec::blob_from_array(&target.values))
                        .await?;
                    chan.send_bytes(&codec::blob_from_mask(&target.mask)).await?;
                }
                if let Some(aux) = &staged.aux_targets {
                    chan.send_bytes(&codec::blob_from_array(aux)).await?;
                }
                Ok::<(), CommsErr>(())
            })?,
        }
        Ok(())
    }

    /// Applies the soft-fail policy to a labelled result: log, dump,
    /// hook. Never fails the task.
    fn health_check(&mut self, record: &OutputRecord) {
        let Some(info) = health::check_broken(record) else {
            return;
        };
        error!("model broken on device {}: {}", self.name, info.detail);

        if let Some(dir) = self.cfg.dump_dir.clone() {
            let params = self.params_for_dump();
            match health::dump_broken(&dir, self.staged.as_ref(), &params, &info) {
                Ok(path) => error!("dumped model broken info to {}", path.display()),
                Err(e) => warn!("failed to write model broken dump: {e}"),
            }
        }

        if let Some(hook) = &mut self.broken_hook {
            hook(&info);
        }
    }

    /// Best-effort parameter snapshot for the dump file.
    fn params_for_dump(&mut self) -> Vec<(String, ArrayD<f32>)> {
        match &mut self.mode {
            Mode::Blocking(local) => local
                .all_params()
                .into_iter()
                .map(|p| (p.name, p.values))
                .collect(),
            Mode::Remote { runtime, chan, .. } => {
                let pulled = runtime.block_on(async {
                    chan.send(&Command::SyncNetTrainParams).await?;
                    chan.send(&Command::GetNetTrainParams).await?;
                    let reply: Reply = chan.recv_control().await?;
                    let Reply::NetTrainParams { shapes } = reply else {
                        return Err(CommsErr::Protocol {
                            expected: "net-train-params reply",
                            got: format!("{reply:?}"),
                        });
                    };
                    let mut blobs = Vec::with_capacity(shapes.len());
                    for _ in 0..shapes.len() {
                        blobs.push(chan.recv_bytes().await?);
                    }
                    let _end: Reply = chan.recv_control().await?;
                    Ok((shapes, blobs))
                });

                match pulled {
                    Ok((shapes, blobs)) => shapes
                        .iter()
                        .zip(&blobs)
                        .enumerate()
                        .filter_map(|(i, (shape, blob))| {
                            codec::array_from_blob(&format!("param.{i}"), shape, blob)
                                .ok()
                                .map(|values| (format!("param.{i}"), values))
                        })
                        .collect(),
                    Err(e) => {
                        warn!("could not pull params for dump: {e}");
                        Vec::new()
                    }
                }
            }
        }
    }
}

/// The bounded result wait: poll once per interval, escalate on expiry.
async fn wait_for_result(
    chan: &mut Channel,
    link: &mut WorkerLink,
    name: &str,
    poll_interval: Duration,
    result_timeout: Duration,
) -> Result<WaitOutcome> {
    let mut waited = Duration::ZERO;

    loop {
        match chan.poll(poll_interval).await {
            Err(CommsErr::ChannelDeath) => {
                info!("device {name} worker died while waiting for result");
                return Ok(WaitOutcome::Sentinel { death: true });
            }
            Err(e) => return Err(e.into()),
            Ok(false) => {
                waited += poll_interval;
                if waited >= result_timeout {
                    error!("result timeout expired for device {name}, killing worker");
                    // Best effort; a wedged worker may ignore anything
                    // short of a kill, and a killed worker is dead either
                    // way.
                    link.kill().await;
                    return Ok(WaitOutcome::Sentinel { death: true });
                }
            }
            Ok(true) => match chan.recv().await? {
                Frame::Err(detail) => {
                    info!("device {name} worker reported error: {detail}");
                    return Ok(WaitOutcome::Sentinel { death: false });
                }
                Frame::Control(payload) => {
                    let reply: Reply =
                        serde_json::from_slice(&payload).map_err(CommsErr::from)?;
                    let Reply::TaskResult { shapes, labels } = reply else {
                        return Err(DeviceErr::UnexpectedReply {
                            expected: "task-result reply",
                            got: format!("{reply:?}"),
                        });
                    };
                    let mut values = Vec::with_capacity(shapes.len());
                    for shape in &shapes {
                        let blob = chan.recv_bytes().await?;
                        values.push(codec::array_from_blob("output", shape, &blob)?);
                    }
                    return Ok(WaitOutcome::Record(OutputRecord::new(values, labels)?));
                }
                Frame::Bytes(_) => {
                    return Err(DeviceErr::UnexpectedReply {
                        expected: "task-result reply",
                        got: "bytes frame".to_string(),
                    });
                }
            },
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Mode::Remote { link, .. } = &mut self.mode {
            if !self.dead {
                link.kill_now();
            }
        }
    }
}
