/// Hardware capability attributes of one compute device.
///
/// Looked up once from the static table at handshake time; immutable for
/// the lifetime of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub compute_units: u32,
    pub clock_mhz: u32,
    pub memory_bytes: u64,
}

/// Fixed headroom reserved for the runtime itself.
const MEMORY_RESERVE: u64 = 512 * 1024 * 1024;

impl DeviceAttributes {
    /// Memory budget available to kernels after the fixed reserve.
    pub fn usable_memory(&self) -> u64 {
        self.memory_bytes.saturating_sub(MEMORY_RESERVE)
    }
}

const GIB: u64 = 1024 * 1024 * 1024;

const DEFAULT: DeviceAttributes = DeviceAttributes {
    compute_units: 1,
    clock_mhz: 1000,
    memory_bytes: 2 * GIB,
};

/// Known device names. Anything else falls back to `DEFAULT`; real
/// capability discovery is out of scope for the coordination layer.
const TABLE: &[(&str, DeviceAttributes)] = &[
    (
        "accel0",
        DeviceAttributes {
            compute_units: 2048,
            clock_mhz: 1126,
            memory_bytes: 4 * GIB,
        },
    ),
    (
        "accel1",
        DeviceAttributes {
            compute_units: 2048,
            clock_mhz: 1126,
            memory_bytes: 4 * GIB,
        },
    ),
    (
        "accel2",
        DeviceAttributes {
            compute_units: 2304,
            clock_mhz: 980,
            memory_bytes: 3 * GIB,
        },
    ),
    (
        "accel3",
        DeviceAttributes {
            compute_units: 2496,
            clock_mhz: 706,
            memory_bytes: 5 * GIB,
        },
    ),
];

/// Attributes for a resolved device name, with the default fallback.
pub fn lookup(name: &str) -> DeviceAttributes {
    TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, attrs)| *attrs)
        .unwrap_or(DEFAULT)
}
