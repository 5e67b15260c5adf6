use std::{error::Error, fmt};

use serde::{Deserialize, Serialize};

/// The class of compute unit a device is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Accelerator,
}

impl DeviceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Accelerator => "accel",
        }
    }
}

/// External device selector: `"cpu<N>"`, `"accel<N>"` or the wildcard
/// forms `"cpuX"` / `"accelX"`, resolved to a concrete index at spawn
/// time. The resolved identity reported back during the handshake is
/// authoritative thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTag {
    pub kind: DeviceKind,
    /// `None` means wildcard.
    pub index: Option<usize>,
}

impl DeviceTag {
    pub fn parse(tag: &str) -> Result<Self, InvalidDeviceTag> {
        let (kind, rest) = if let Some(rest) = tag.strip_prefix("accelerator") {
            (DeviceKind::Accelerator, rest)
        } else if let Some(rest) = tag.strip_prefix("accel") {
            (DeviceKind::Accelerator, rest)
        } else if let Some(rest) = tag.strip_prefix("cpu") {
            (DeviceKind::Cpu, rest)
        } else {
            return Err(InvalidDeviceTag(tag.to_string()));
        };

        let index = match rest {
            "X" => None,
            _ => Some(
                rest.parse()
                    .map_err(|_| InvalidDeviceTag(tag.to_string()))?,
            ),
        };

        Ok(Self { kind, index })
    }

    /// Resolves the concrete identity for this tag.
    ///
    /// Wildcards resolve to index 0; real capability discovery is the
    /// embedder's concern and happens before the tag is built.
    ///
    /// # Returns
    /// The numeric device id and the canonical device name.
    pub fn resolve(&self) -> (usize, String) {
        let index = self.index.unwrap_or(0);
        (index, format!("{}{}", self.kind.prefix(), index))
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}{}", self.kind.prefix(), i),
            None => write!(f, "{}X", self.kind.prefix()),
        }
    }
}

/// The given device tag string could not be parsed.
#[derive(Debug)]
pub struct InvalidDeviceTag(pub String);

impl fmt::Display for InvalidDeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid device tag: {}", self.0)
    }
}

impl Error for InvalidDeviceTag {}
