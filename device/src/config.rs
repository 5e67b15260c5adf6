use std::path::PathBuf;
use std::time::Duration;

use comms::{
    specs::{ShapeCheck, TaskKind, TopologySpec, TrainParamSelection, UpdateSpec},
    transport::SpawnOptions,
};

/// Everything a device handle needs besides its tag.
///
/// Plain data with working defaults; the embedder's configuration layer
/// fills it however it likes.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Initial network topology the worker compiles at startup.
    pub topology: TopologySpec,
    pub task: TaskKind,
    pub update: UpdateSpec,
    pub train_params: Option<TrainParamSelection>,
    pub shape_check: ShapeCheck,
    /// Bounded wait inside `result()`.
    pub result_timeout: Duration,
    /// Channel poll granularity inside `result()`.
    pub poll_interval: Duration,
    /// Grace period for `terminate()` before the hard kill.
    pub terminate_grace: Duration,
    /// Where model-broken dumps go; `None` disables dumping.
    pub dump_dir: Option<PathBuf>,
    /// How worker processes are launched in process mode.
    pub spawn: SpawnOptions,
}

impl DeviceConfig {
    pub fn new(topology: TopologySpec) -> Self {
        Self {
            topology,
            task: TaskKind::Train,
            update: UpdateSpec::default(),
            train_params: None,
            shape_check: ShapeCheck::default(),
            result_timeout: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_secs(1),
            terminate_grace: Duration::from_secs(10),
            dump_dir: None,
            spawn: SpawnOptions::default(),
        }
    }
}
