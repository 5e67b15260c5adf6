//! Wire-level types exchanged between a device handle and its worker.

mod batch;
mod device;
mod protocol;
mod task;
mod topology;
mod update;
mod worker;

pub use batch::{BatchDescriptor, TargetDescriptor};
pub use device::{DeviceKind, DeviceTag, InvalidDeviceTag};
pub use protocol::{Command, ExecReply, RemoteCall, Reply};
pub use task::TaskKind;
pub use topology::{TopologySpec, TrainParamSelection};
pub use update::{ShapeCheck, UpdateRule, UpdateSpec};
pub use worker::{WORKER_SPEC_ENV, WorkerSpec};
