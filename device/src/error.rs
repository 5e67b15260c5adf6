use std::{error::Error, fmt, io};

use comms::{CommsErr, specs::InvalidDeviceTag};
use kernel::KernelErr;
use model::ModelErr;

/// Coordinator-side device failures.
#[derive(Debug)]
pub enum DeviceErr {
    Comms(CommsErr),
    Kernel(KernelErr),
    Model(ModelErr),
    InvalidTag(InvalidDeviceTag),
    /// The worker died or misbehaved during the startup handshake;
    /// handle construction is aborted.
    Handshake {
        detail: String,
    },
    /// `result()` was called although every `run()` already has its
    /// result.
    ResultWithoutRun {
        run_called: u64,
        result_called: u64,
    },
    /// `run()` without a staged batch.
    NoBatch,
    UnexpectedReply {
        expected: &'static str,
        got: String,
    },
    Io(io::Error),
}

impl fmt::Display for DeviceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceErr::Comms(e) => write!(f, "channel error: {e}"),
            DeviceErr::Kernel(e) => write!(f, "kernel error: {e}"),
            DeviceErr::Model(e) => write!(f, "parameter error: {e}"),
            DeviceErr::InvalidTag(e) => write!(f, "{e}"),
            DeviceErr::Handshake { detail } => write!(f, "worker handshake failed: {detail}"),
            DeviceErr::ResultWithoutRun {
                run_called,
                result_called,
            } => write!(
                f,
                "result() without outstanding run(): {result_called} results for {run_called} runs"
            ),
            DeviceErr::NoBatch => write!(f, "run() without a staged batch"),
            DeviceErr::UnexpectedReply { expected, got } => {
                write!(f, "unexpected reply: expected {expected}, got {got}")
            }
            DeviceErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for DeviceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeviceErr::Comms(e) => Some(e),
            DeviceErr::Kernel(e) => Some(e),
            DeviceErr::Model(e) => Some(e),
            DeviceErr::InvalidTag(e) => Some(e),
            DeviceErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommsErr> for DeviceErr {
    fn from(value: CommsErr) -> Self {
        Self::Comms(value)
    }
}

impl From<KernelErr> for DeviceErr {
    fn from(value: KernelErr) -> Self {
        Self::Kernel(value)
    }
}

impl From<ModelErr> for DeviceErr {
    fn from(value: ModelErr) -> Self {
        Self::Model(value)
    }
}

impl From<InvalidDeviceTag> for DeviceErr {
    fn from(value: InvalidDeviceTag) -> Self {
        Self::InvalidTag(value)
    }
}

impl From<io::Error> for DeviceErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
