//! The typed command protocol driving a worker's command loop.
//!
//! Commands and replies are closed enums; an operation that is not a
//! variant here cannot be expressed on the wire. Multi-frame sequences
//! (parameter pushes/pulls, batch uploads, task results) are delimited by
//! the explicit `End..` sentinels and by counts carried in the headers;
//! both ends must agree on the exact frame order per command.

use serde::{Deserialize, Serialize};

use super::{BatchDescriptor, TaskKind, TopologySpec, TrainParamSelection};

/// The closed set of remote-callable worker operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCall {
    /// The set of auxiliary target keys the compiled net consumes.
    UsedDataKeys,
    StartEpochStats,
    FinishEpochStats,
}

/// Result value of a `RemoteCall`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecReply {
    UsedDataKeys { keys: Vec<String> },
    Unit,
}

/// Coordinator-to-worker commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Terminal command; the worker replies `Done` and exits its loop.
    Stop,
    Exec(RemoteCall),
    /// Reset optimizer step state for a new epoch. No reply.
    Reset { epoch: usize },
    /// Rebuild kernels when the topology or the train-parameter
    /// declaration differs; always answered with `ReinitReady`.
    Reinit {
        topology: TopologySpec,
        train_params: Option<TrainParamSelection>,
    },
    /// Followed by byte frames: input, input mask, then per target key
    /// its buffer and mask, then the auxiliary buffer when
    /// `aux_len` is set. Fire-and-forget, no reply.
    UpdateData(BatchDescriptor),
    /// Forwarded to the optimizer if one exists. No reply.
    SetLearningRate { lr: f32 },
    /// Followed by one byte frame per shape, then `EndSetNetParams`.
    /// Updates all parameters of both the trainer and evaluator copies.
    SetNetParams { shapes: Vec<Vec<usize>> },
    EndSetNetParams,
    GetNumUpdates,
    /// Snapshot all parameters into the worker-local cache. No reply.
    SyncNetTrainParams,
    /// Served from the cache: `NetTrainParams`, byte frames, sentinel.
    GetNetTrainParams,
    Task { task: TaskKind },
}

/// Worker-to-coordinator replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Handshake step 1: concrete identity of the resolved device.
    DeviceResolved {
        device_id: usize,
        device_name: String,
    },
    /// Handshake step 2: kernels built, worker enters its command loop.
    Ready { num_train_params: usize },
    Done,
    ExecResult(ExecReply),
    ReinitReady { num_train_params: usize },
    NumUpdates { count: u64 },
    /// Followed by one byte frame per shape, then `EndNetTrainParams`.
    NetTrainParams { shapes: Vec<Vec<usize>> },
    EndNetTrainParams,
    /// Followed by one byte frame per shape. `labels`, when present, is
    /// positional with the value list.
    TaskResult {
        shapes: Vec<Vec<usize>>,
        labels: Option<Vec<String>>,
    },
}
