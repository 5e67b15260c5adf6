//! The command-dispatch loop running inside a worker.
//!
//! One state, "ready": after the startup handshake the worker serves
//! commands strictly in order, one at a time, and never reads the next
//! command while one is executing. Reply sequences per command are fixed;
//! any deviation on either side is a protocol violation.

use comms::{
    FrameReceiver, FrameSender,
    specs::{Command, ExecReply, RemoteCall, Reply, WorkerSpec},
};
use kernel::{DeviceBatch, KernelErr, LocalDevice, ModelCompiler, TargetBatch};
use log::{debug, info, warn};
use model::codec;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Result, WorkerErr};

/// Runs a worker over the given channel ends until `Stop` or failure.
///
/// # Arguments
/// * `spec` - Spawn-time configuration (device tag, task, topology).
/// * `compiler` - The model compiler collaborator.
/// * `rx` - Receiving end of the coordinator channel.
/// * `tx` - Sending end of the coordinator channel.
///
/// # Returns
/// `Ok(())` after a graceful `Stop`. A returned error means the worker
/// must exit: the channel died, the protocol was violated, or a
/// non-recoverable fault was hit.
pub async fn serve<R, W>(
    spec: WorkerSpec,
    compiler: Box<dyn ModelCompiler>,
    mut rx: FrameReceiver<R>,
    mut tx: FrameSender<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    // Handshake step 1: authoritative device identity.
    let (device_id, device_name) = spec.device.resolve();
    tx.send(&Reply::DeviceResolved {
        device_id,
        device_name: device_name.clone(),
    })
    .await?;

    // Handshake step 2: build kernels, report the trainable count.
    let mut dev = LocalDevice::initialize(
        device_name.clone(),
        compiler,
        spec.topology,
        spec.task,
        spec.update,
        spec.train_params,
        spec.shape_check,
    )?;
    tx.send(&Reply::Ready {
        num_train_params: dev.train_param_count(),
    })
    .await?;

    info!(device = device_name.as_str(); "worker ready for commands");

    loop {
        let cmd: Command = rx.recv().await?;
        debug!(device = device_name.as_str(); "command: {cmd:?}");

        match cmd {
            Command::Stop => {
                tx.send(&Reply::Done).await?;
                break;
            }

            Command::Exec(call) => {
                let reply = exec(&mut dev, call);
                tx.send(&Reply::ExecResult(reply)).await?;
            }

            Command::Reset { epoch } => dev.reset(epoch),

            Command::Reinit {
                topology,
                train_params,
            } => {
                let num_train_params = dev.reinit(topology, train_params)?;
                tx.send(&Reply::ReinitReady { num_train_params }).await?;
            }

            Command::UpdateData(desc) => {
                let batch = recv_batch(&mut rx, &desc).await?;
                dev.set_batch(batch)?;
            }

            Command::SetLearningRate { lr } => dev.set_learning_rate(lr),

            Command::SetNetParams { shapes } => {
                let mut blobs = Vec::with_capacity(shapes.len());
                for _ in 0..shapes.len() {
                    blobs.push(rx.recv_bytes().await?);
                }
                let sentinel: Command = rx.recv().await?;
                if sentinel != Command::EndSetNetParams {
                    return Err(WorkerErr::Protocol {
                        detail: format!("expected end-set-net-params, got {sentinel:?}"),
                    });
                }
                dev.set_net_params(&shapes, &blobs)?;
            }

            Command::GetNumUpdates => {
                tx.send(&Reply::NumUpdates {
                    count: dev.num_updates(),
                })
                .await?;
            }

            Command::SyncNetTrainParams => dev.sync_net_train_params(),

            Command::GetNetTrainParams => {
                let (shapes, blobs) = dev.synced_params();
                let shapes = shapes.to_vec();
                let blobs = blobs.to_vec();
                tx.send(&Reply::NetTrainParams { shapes }).await?;
                for blob in &blobs {
                    tx.send_bytes(blob).await?;
                }
                tx.send(&Reply::EndNetTrainParams).await?;
            }

            Command::Task { task } => match dev.run_task(task) {
                Ok((values, labels)) => {
                    let shapes = values.iter().map(|v| v.shape().to_vec()).collect();
                    tx.send(&Reply::TaskResult { shapes, labels }).await?;
                    for value in &values {
                        tx.send_bytes(&codec::blob_from_array(value)).await?;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(device = device_name.as_str(); "runtime fault: {e}");
                    tx.send_err(&e.to_string()).await?;
                }
                Err(e) => {
                    // Resource exhaustion or a contract violation: report,
                    // then let the process die rather than serve from a
                    // possibly corrupted state.
                    tx.send_err(&e.to_string()).await?;
                    return Err(e.into());
                }
            },

            Command::EndSetNetParams => {
                return Err(WorkerErr::Protocol {
                    detail: "end-set-net-params outside a set-net-params sequence".to_string(),
                });
            }
        }
    }

    info!(device = device_name.as_str(); "worker finished");
    Ok(())
}

fn exec(dev: &mut LocalDevice, call: RemoteCall) -> ExecReply {
    match call {
        RemoteCall::UsedDataKeys => ExecReply::UsedDataKeys {
            keys: dev.used_data_keys(),
        },
        RemoteCall::StartEpochStats => {
            dev.start_epoch_stats();
            ExecReply::Unit
        }
        RemoteCall::FinishEpochStats => {
            dev.finish_epoch_stats();
            ExecReply::Unit
        }
    }
}

/// Receives the fixed buffer sequence following an `UpdateData` header:
/// input, input mask, per key target and mask, then the auxiliary buffer
/// when the descriptor declares one.
async fn recv_batch<R>(
    rx: &mut FrameReceiver<R>,
    desc: &comms::specs::BatchDescriptor,
) -> Result<DeviceBatch>
where
    R: AsyncRead + Unpin + Send,
{
    let mut batch = DeviceBatch::alloc(desc)?;

    let blob = rx.recv_bytes().await?;
    batch.input = codec::array_from_blob("input", &desc.input_shape, &blob)
        .map_err(KernelErr::from)?;

    let mask_shape = comms::specs::BatchDescriptor::mask_shape(&desc.input_shape);
    let blob = rx.recv_bytes().await?;
    batch.input_mask =
        codec::mask_from_blob("input_mask", &mask_shape, &blob).map_err(KernelErr::from)?;

    for target in &desc.targets {
        let blob = rx.recv_bytes().await?;
        let values = codec::array_from_blob(&target.key, &target.shape, &blob)
            .map_err(KernelErr::from)?;
        let mask_shape = comms::specs::BatchDescriptor::mask_shape(&target.shape);
        let blob = rx.recv_bytes().await?;
        let mask = codec::mask_from_blob(&target.key, &mask_shape, &blob)
            .map_err(KernelErr::from)?;

        let slot = batch
            .target_mut(&target.key)
            .ok_or_else(|| WorkerErr::Protocol {
                detail: format!("update-data buffer for undeclared key {}", target.key),
            })?;
        *slot = TargetBatch {
            key: target.key.clone(),
            values,
            mask,
        };
    }

    if let Some(aux_len) = desc.aux_len {
        let shape = [desc.num_slots(), aux_len];
        let blob = rx.recv_bytes().await?;
        batch.aux_targets =
            Some(codec::array_from_blob("aux_targets", &shape, &blob).map_err(KernelErr::from)?);
    }

    Ok(batch)
}
