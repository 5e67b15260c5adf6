use std::{env, io};

use serde::{Deserialize, Serialize};

use super::{DeviceTag, ShapeCheck, TaskKind, TopologySpec, TrainParamSelection, UpdateSpec};

/// Environment variable carrying the serialized `WorkerSpec` into a
/// spawned worker process.
pub const WORKER_SPEC_ENV: &str = "DEVICE_WORKER_SPEC";

/// Spawn-time bootstrap specification for a worker.
///
/// Injected into the worker's environment at spawn so the worker can
/// resolve its device and build its kernels before the handshake, without
/// any coordinator-to-worker traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub device: DeviceTag,
    pub task: TaskKind,
    pub update: UpdateSpec,
    pub topology: TopologySpec,
    pub train_params: Option<TrainParamSelection>,
    #[serde(default)]
    pub shape_check: ShapeCheck,
}

impl WorkerSpec {
    /// Serializes this spec for the spawn environment.
    pub fn to_env_value(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Reads the spec back inside the worker process.
    ///
    /// # Returns
    /// The spec, or an io error if the variable is missing or malformed.
    pub fn from_env() -> io::Result<Self> {
        let raw = env::var(WORKER_SPEC_ENV)
            .map_err(|_| io::Error::other(format!("{WORKER_SPEC_ENV} not set")))?;
        serde_json::from_str(&raw).map_err(io::Error::other)
    }

    /// Whether the current process was launched as a worker.
    pub fn in_env() -> bool {
        env::var_os(WORKER_SPEC_ENV).is_some()
    }
}
