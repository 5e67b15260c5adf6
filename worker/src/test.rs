#![cfg(test)]

use comms::{
    Frame, FrameReceiver, FrameSender,
    specs::{
        BatchDescriptor, Command, DeviceKind, DeviceTag, ExecReply, RemoteCall, Reply, ShapeCheck,
        TargetDescriptor, TaskKind, TopologySpec, TrainParamSelection, UpdateSpec, WorkerSpec,
    },
};
use kernel::mock::{FAULT_RECOVERABLE_TAG, FAULT_RESOURCE_TAG, MockCompiler, mock_topology};
use model::codec;
use tokio::{
    io::{self, DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};

use crate::{Result, WorkerErr, serve};

type CoordRx = FrameReceiver<ReadHalf<DuplexStream>>;
type CoordTx = FrameSender<WriteHalf<DuplexStream>>;

fn worker_spec() -> WorkerSpec {
    WorkerSpec {
        device: DeviceTag {
            kind: DeviceKind::Cpu,
            index: Some(1),
        },
        task: TaskKind::Train,
        update: UpdateSpec {
            block_size: 4,
            ..UpdateSpec::default()
        },
        topology: mock_topology(&[("w", &[4]), ("b", &[])]),
        train_params: None,
        shape_check: ShapeCheck::Strict,
    }
}

fn start_worker(spec: WorkerSpec) -> (CoordRx, CoordTx, JoinHandle<Result<()>>) {
    let (coord_stream, worker_stream) = io::duplex(1 << 16);

    let (coord_rx, coord_tx) = io::split(coord_stream);
    let (coord_rx, coord_tx) = comms::channel(coord_rx, coord_tx);

    let handle = tokio::spawn(async move {
        let (rx, tx) = io::split(worker_stream);
        let (rx, tx) = comms::channel(rx, tx);
        serve(spec, Box::new(MockCompiler), rx, tx).await
    });

    (coord_rx, coord_tx, handle)
}

async fn handshake(rx: &mut CoordRx) -> (usize, String, usize) {
    let resolved: Reply = rx.recv().await.unwrap();
    let Reply::DeviceResolved {
        device_id,
        device_name,
    } = resolved
    else {
        panic!("expected DeviceResolved, got {resolved:?}");
    };
    let ready: Reply = rx.recv().await.unwrap();
    let Reply::Ready { num_train_params } = ready else {
        panic!("expected Ready, got {ready:?}");
    };
    (device_id, device_name, num_train_params)
}

fn batch_desc(slots: usize) -> BatchDescriptor {
    BatchDescriptor {
        input_shape: vec![2, slots, 4],
        targets: vec![TargetDescriptor {
            key: "classes".to_string(),
            shape: vec![2, slots],
        }],
        tags: (0..slots).map(|i| format!("seq-{i}")).collect(),
        aux_len: None,
    }
}

/// Sends the full update-data sequence: ones input, all-valid masks,
/// zero targets.
async fn send_batch(tx: &mut CoordTx, desc: &BatchDescriptor) {
    tx.send(&Command::UpdateData(desc.clone())).await.unwrap();

    let input_len: usize = desc.input_shape.iter().product();
    let input: Vec<f32> = vec![1.0; input_len];
    tx.send_bytes(bytemuck_bytes(&input)).await.unwrap();

    let mask_len: usize = BatchDescriptor::mask_shape(&desc.input_shape).iter().product();
    tx.send_bytes(&vec![1u8; mask_len]).await.unwrap();

    for target in &desc.targets {
        let len: usize = target.shape.iter().product();
        let values: Vec<f32> = vec![0.0; len];
        tx.send_bytes(bytemuck_bytes(&values)).await.unwrap();
        let mask_len: usize = BatchDescriptor::mask_shape(&target.shape).iter().product();
        tx.send_bytes(&vec![1u8; mask_len]).await.unwrap();
    }

    if let Some(aux_len) = desc.aux_len {
        let values: Vec<f32> = vec![0.0; desc.num_slots() * aux_len];
        tx.send_bytes(bytemuck_bytes(&values)).await.unwrap();
    }
}

fn bytemuck_bytes(values: &[f32]) -> &[u8] {
    bytemuck::cast_slice(values)
}

async fn recv_task_result(rx: &mut CoordRx) -> (Vec<Vec<usize>>, Option<Vec<String>>, Vec<Vec<f32>>) {
    let reply: Reply = rx.recv().await.unwrap();
    let Reply::TaskResult { shapes, labels } = reply else {
        panic!("expected TaskResult, got {reply:?}");
    };
    let mut values = Vec::new();
    for shape in &shapes {
        let blob = rx.recv_bytes().await.unwrap();
        let arr = codec::array_from_blob("out", shape, &blob).unwrap();
        values.push(arr.iter().copied().collect());
    }
    (shapes, labels, values)
}

#[tokio::test]
async fn handshake_reports_identity_then_param_count() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());

    let (id, name, num_train_params) = handshake(&mut rx).await;
    assert_eq!(id, 1);
    assert_eq!(name, "cpu1");
    assert_eq!(num_train_params, 2);

    tx.send(&Command::Stop).await.unwrap();
    let done: Reply = rx.recv().await.unwrap();
    assert_eq!(done, Reply::Done);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn train_task_accumulates_blocks_and_labels() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    // 10 slots with block_size 4: blocks [0,4) [4,8) [8,10).
    send_batch(&mut tx, &batch_desc(10)).await;
    tx.send(&Command::Task {
        task: TaskKind::Train,
    })
    .await
    .unwrap();

    let (shapes, labels, values) = recv_task_result(&mut rx).await;
    assert_eq!(shapes, vec![Vec::<usize>::new(), Vec::<usize>::new()]);
    assert_eq!(
        labels.unwrap(),
        vec!["cost:classes".to_string(), "gradient_norm".to_string()]
    );
    // Each slot's masked input sum is 2 * 4 = 8; zero weights make the
    // cost (0 + 1) * 8 per slot, summed over all 10 slots.
    assert_eq!(values[0][0], 80.0);

    // Three optimizer updates, one per block.
    tx.send(&Command::GetNumUpdates).await.unwrap();
    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(reply, Reply::NumUpdates { count: 3 });

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn reset_clears_update_counter() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    send_batch(&mut tx, &batch_desc(4)).await;
    tx.send(&Command::Task {
        task: TaskKind::Train,
    })
    .await
    .unwrap();
    recv_task_result(&mut rx).await;

    tx.send(&Command::Reset { epoch: 2 }).await.unwrap();
    tx.send(&Command::GetNumUpdates).await.unwrap();
    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(reply, Reply::NumUpdates { count: 0 });

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn set_net_params_updates_served_snapshots() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    let w = vec![0.25f32, -0.5, 1.0, 2.0];
    let b = vec![3.0f32];
    tx.send(&Command::SetNetParams {
        shapes: vec![vec![4], vec![]],
    })
    .await
    .unwrap();
    tx.send_bytes(bytemuck_bytes(&w)).await.unwrap();
    tx.send_bytes(bytemuck_bytes(&b)).await.unwrap();
    tx.send(&Command::EndSetNetParams).await.unwrap();

    tx.send(&Command::SyncNetTrainParams).await.unwrap();
    tx.send(&Command::GetNetTrainParams).await.unwrap();

    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(
        reply,
        Reply::NetTrainParams {
            shapes: vec![vec![4], vec![]]
        }
    );
    let w_back = rx.recv_bytes().await.unwrap();
    assert_eq!(w_back, bytemuck_bytes(&w));
    let b_back = rx.recv_bytes().await.unwrap();
    assert_eq!(b_back, bytemuck_bytes(&b));
    let end: Reply = rx.recv().await.unwrap();
    assert_eq!(end, Reply::EndNetTrainParams);

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn unsynced_params_serve_an_empty_sequence() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    tx.send(&Command::GetNetTrainParams).await.unwrap();
    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(reply, Reply::NetTrainParams { shapes: vec![] });
    let end: Reply = rx.recv().await.unwrap();
    assert_eq!(end, Reply::EndNetTrainParams);

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn missing_sentinel_is_a_fatal_protocol_violation() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    tx.send(&Command::SetNetParams {
        shapes: vec![vec![4], vec![]],
    })
    .await
    .unwrap();
    tx.send_bytes(bytemuck_bytes(&[0.0f32; 4])).await.unwrap();
    tx.send_bytes(bytemuck_bytes(&[0.0f32])).await.unwrap();
    // Out-of-sequence command where the sentinel belongs.
    tx.send(&Command::GetNumUpdates).await.unwrap();

    match handle.await.unwrap() {
        Err(WorkerErr::Protocol { detail }) => {
            assert!(detail.contains("end-set-net-params"), "{detail}");
        }
        other => panic!("expected protocol violation, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_frame_kind_for_command_is_fatal() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    tx.send_bytes(&[1, 2, 3]).await.unwrap();

    match handle.await.unwrap() {
        Err(WorkerErr::Comms(comms::CommsErr::Protocol { .. })) => {}
        other => panic!("expected protocol violation, got {other:?}"),
    }
}

#[tokio::test]
async fn recoverable_fault_reports_error_and_keeps_serving() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    let mut desc = batch_desc(4);
    desc.tags[0] = FAULT_RECOVERABLE_TAG.to_string();
    send_batch(&mut tx, &desc).await;
    tx.send(&Command::Task {
        task: TaskKind::Train,
    })
    .await
    .unwrap();

    match rx.recv_frame().await.unwrap() {
        Frame::Err(detail) => assert!(detail.contains("runtime fault"), "{detail}"),
        other => panic!("expected err frame, got {other:?}"),
    }

    // The loop keeps serving after a recoverable fault.
    tx.send(&Command::Exec(RemoteCall::UsedDataKeys)).await.unwrap();
    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(
        reply,
        Reply::ExecResult(ExecReply::UsedDataKeys {
            keys: vec!["classes".to_string()]
        })
    );

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn resource_fault_reports_error_then_dies() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    let mut desc = batch_desc(4);
    desc.tags[0] = FAULT_RESOURCE_TAG.to_string();
    send_batch(&mut tx, &desc).await;
    tx.send(&Command::Task {
        task: TaskKind::Train,
    })
    .await
    .unwrap();

    match rx.recv_frame().await.unwrap() {
        Frame::Err(detail) => assert!(detail.contains("allocation"), "{detail}"),
        other => panic!("expected err frame, got {other:?}"),
    }

    match handle.await.unwrap() {
        Err(WorkerErr::Kernel(e)) => assert!(!e.is_recoverable()),
        other => panic!("expected fatal kernel error, got {other:?}"),
    }
}

#[tokio::test]
async fn reinit_only_rebuilds_on_difference() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    tx.send(&Command::Reinit {
        topology: mock_topology(&[("w", &[4]), ("b", &[])]),
        train_params: None,
    })
    .await
    .unwrap();
    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(
        reply,
        Reply::ReinitReady {
            num_train_params: 2
        }
    );

    tx.send(&Command::Reinit {
        topology: mock_topology(&[("w", &[4]), ("b", &[]), ("w_out", &[4, 2])]),
        train_params: Some(TrainParamSelection {
            layers: Vec::new(),
            params: vec!["w".to_string()],
        }),
    })
    .await
    .unwrap();
    let reply: Reply = rx.recv().await.unwrap();
    assert_eq!(
        reply,
        Reply::ReinitReady {
            num_train_params: 1
        }
    );

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn aux_targets_follow_the_descriptor() {
    let mut spec = worker_spec();
    spec.topology = TopologySpec::from_value(serde_json::json!({
        "params": [{ "name": "w", "shape": [4] }],
        "loss": "ctc",
    }));
    let (mut rx, mut tx, handle) = start_worker(spec);
    handshake(&mut rx).await;

    let mut desc = batch_desc(3);
    desc.aux_len = Some(5);
    send_batch(&mut tx, &desc).await;

    tx.send(&Command::Task {
        task: TaskKind::Train,
    })
    .await
    .unwrap();
    let (_, labels, _) = recv_task_result(&mut rx).await;
    assert!(labels.is_some());

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn eval_task_uses_eval_labels() {
    let (mut rx, mut tx, handle) = start_worker(worker_spec());
    handshake(&mut rx).await;

    send_batch(&mut tx, &batch_desc(4)).await;
    tx.send(&Command::Task {
        task: TaskKind::Eval,
    })
    .await
    .unwrap();

    let (_, labels, values) = recv_task_result(&mut rx).await;
    assert_eq!(
        labels.unwrap(),
        vec!["cost:classes".to_string(), "error:classes".to_string()]
    );
    // The error output counts slots, summed over the single block.
    assert_eq!(values[1][0], 4.0);

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn forward_task_returns_unlabelled_per_slot_values() {
    let mut spec = worker_spec();
    spec.task = TaskKind::Forward;
    let (mut rx, mut tx, handle) = start_worker(spec);
    handshake(&mut rx).await;

    send_batch(&mut tx, &batch_desc(3)).await;
    tx.send(&Command::Task {
        task: TaskKind::Forward,
    })
    .await
    .unwrap();

    let (shapes, labels, values) = recv_task_result(&mut rx).await;
    assert_eq!(shapes, vec![vec![3]]);
    assert!(labels.is_none());
    assert_eq!(values[0], vec![8.0, 8.0, 8.0]);

    tx.send(&Command::Stop).await.unwrap();
    let _: Reply = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
}
