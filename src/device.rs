//! Device tags identifying the memory/execution domain a hashmap lives in.

use alloc::string::ToString;
use core::fmt;
use core::str::FromStr;

use crate::error::Error;

/// The kind of memory/execution domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceType {
    /// Host memory.
    Cpu,
    /// Accelerator-resident memory. No backend in this crate serves it.
    Cuda,
}

impl DeviceType {
    fn as_str(self) -> &'static str {
        match self {
            DeviceType::Cpu => "CPU",
            DeviceType::Cuda => "CUDA",
        }
    }
}

/// An opaque, equality-comparable tag naming one memory/execution domain.
///
/// Displayed and parsed as `TYPE:ID`, e.g. `CPU:0` or `CUDA:1`. Parsing is
/// case-insensitive and a missing id defaults to `0`.
///
/// ```rust
/// # use record_hashmap::Device;
/// let device: Device = "cuda:1".parse().unwrap();
/// assert_eq!(device.to_string(), "CUDA:1");
/// assert!(!device.is_host());
/// assert_eq!("CPU".parse::<Device>().unwrap(), Device::cpu());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    device_type: DeviceType,
    id: u32,
}

impl Device {
    /// Creates a device tag.
    pub const fn new(device_type: DeviceType, id: u32) -> Self {
        Self { device_type, id }
    }

    /// The host device, `CPU:0`.
    pub const fn cpu() -> Self {
        Self::new(DeviceType::Cpu, 0)
    }

    /// Returns the kind of this device.
    pub const fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Returns the ordinal of this device within its kind.
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns `true` if memory on this device is addressable from the host.
    pub const fn is_host(&self) -> bool {
        matches!(self.device_type, DeviceType::Cpu)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_type.as_str(), self.id)
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = || Error::ParseDevice(s.to_string());

        let (kind, id) = match s.trim().split_once(':') {
            Some((kind, id)) => (kind, id.trim().parse().map_err(|_| parse_error())?),
            None => (s.trim(), 0),
        };

        let device_type = if kind.eq_ignore_ascii_case("cpu") {
            DeviceType::Cpu
        } else if kind.eq_ignore_ascii_case("cuda") {
            DeviceType::Cuda
        } else {
            return Err(parse_error());
        };

        Ok(Device::new(device_type, id))
    }
}
