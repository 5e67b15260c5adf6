use std::{error::Error, fmt, io};

/// Channel and protocol failures.
#[derive(Debug)]
pub enum CommsErr {
    Io(io::Error),
    /// The peer process terminated; distinct from every other condition.
    ChannelDeath,
    Protocol {
        expected: &'static str,
        got: String,
    },
    Decode(serde_json::Error),
}

impl fmt::Display for CommsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsErr::Io(e) => write!(f, "io error: {e}"),
            CommsErr::ChannelDeath => write!(f, "channel peer died"),
            CommsErr::Protocol { expected, got } => {
                write!(f, "protocol violation: expected {expected}, got {got}")
            }
            CommsErr::Decode(e) => write!(f, "control frame decode error: {e}"),
        }
    }
}

impl Error for CommsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommsErr::Io(e) => Some(e),
            CommsErr::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CommsErr {
    fn from(value: io::Error) -> Self {
        // A closed pipe on the write side means the peer is gone.
        if value.kind() == io::ErrorKind::BrokenPipe {
            return Self::ChannelDeath;
        }
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CommsErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<CommsErr> for io::Error {
    fn from(value: CommsErr) -> Self {
        match value {
            CommsErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
