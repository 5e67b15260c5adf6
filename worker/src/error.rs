use std::{error::Error, fmt, io};

use comms::CommsErr;
use kernel::KernelErr;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Comms(CommsErr),
    Kernel(KernelErr),
    /// A frame arrived out of the agreed per-command sequence.
    Protocol { detail: String },
    Bootstrap(io::Error),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Comms(e) => write!(f, "channel error: {e}"),
            WorkerErr::Kernel(e) => write!(f, "kernel error: {e}"),
            WorkerErr::Protocol { detail } => write!(f, "protocol violation: {detail}"),
            WorkerErr::Bootstrap(e) => write!(f, "worker bootstrap failed: {e}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Comms(e) => Some(e),
            WorkerErr::Kernel(e) => Some(e),
            WorkerErr::Bootstrap(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommsErr> for WorkerErr {
    fn from(value: CommsErr) -> Self {
        Self::Comms(value)
    }
}

impl From<KernelErr> for WorkerErr {
    fn from(value: KernelErr) -> Self {
        Self::Kernel(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Comms(e) => e.into(),
            WorkerErr::Bootstrap(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
