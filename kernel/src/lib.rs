mod batch;
mod compute;
mod error;
mod local;
mod metrics;
pub mod mock;
pub mod runner;

pub use batch::{DeviceBatch, TargetBatch};
pub use compute::{ComputeFault, ComputeKernel, DeviceNet, ModelCompiler, NetworkDescription};
pub use error::KernelErr;
pub use local::LocalDevice;
pub use metrics::DeviceMetrics;

/// The kernel module's result type.
pub type Result<T> = std::result::Result<T, KernelErr>;
