//! Construction parameters and the device-dispatching factory.

use alloc::boxed::Box;

use crate::cpu::CpuHashmap;
use crate::device::Device;
use crate::device::DeviceType;
use crate::error::Error;
use crate::error::Result;
use crate::functor::KeyEq;
use crate::functor::KeyHash;
use crate::hashmap::Hashmap;
use crate::memory::CpuMemoryManager;
use crate::memory::MemoryManager;

/// What an insert does when it cannot allocate the buffers for an element.
///
/// Either way, the buffers already allocated for that element are released
/// first, and entries committed for earlier elements stay in the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllocFailurePolicy {
    /// Report the element with mask `0` and go on with the rest of the batch.
    #[default]
    Skip,
    /// Stop the batch and return the allocation error.
    Abort,
}

/// Parameters of a hashmap.
///
/// ```rust
/// # use record_hashmap::{AllocFailurePolicy, Device, Hashmap, HashmapConfig};
/// let map = HashmapConfig::new(12, 4)
///     .with_capacity(1 << 10)
///     .on_device(Device::cpu())
///     .on_alloc_failure(AllocFailurePolicy::Abort)
///     .build_default()
///     .unwrap();
/// assert_eq!(map.dsize_key(), 12);
/// assert!(map.capacity() >= 1 << 10);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HashmapConfig {
    /// Sizing hint for the backing structure.
    pub capacity: usize,
    /// Size of a key record in bytes. Must be non-zero.
    pub dsize_key: usize,
    /// Size of a value record in bytes. Zero turns the map into a set.
    pub dsize_value: usize,
    /// Device the entries live on.
    pub device: Device,
    /// Behavior on allocation failure during insert.
    pub on_alloc_failure: AllocFailurePolicy,
}

impl HashmapConfig {
    /// A host configuration with no capacity hint.
    pub fn new(dsize_key: usize, dsize_value: usize) -> Self {
        Self {
            capacity: 0,
            dsize_key,
            dsize_value,
            device: Device::cpu(),
            on_alloc_failure: AllocFailurePolicy::default(),
        }
    }

    /// Sets the capacity hint.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the device.
    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Sets the allocation failure policy.
    pub fn on_alloc_failure(mut self, policy: AllocFailurePolicy) -> Self {
        self.on_alloc_failure = policy;
        self
    }

    /// Checks the parameters independently of any backend.
    pub fn validate(&self) -> Result<()> {
        if self.dsize_key == 0 {
            return Err(Error::InvalidConfig("key size must be non-zero"));
        }
        Ok(())
    }

    /// Builds a host hashmap with the given functors.
    pub fn build<H: KeyHash, E: KeyEq>(self) -> Result<CpuHashmap<H, E>> {
        CpuHashmap::with_config(self, CpuMemoryManager)
    }

    /// Builds a host hashmap with the default functors.
    pub fn build_default(self) -> Result<CpuHashmap> {
        self.build()
    }

    /// Builds a host hashmap allocating through `memory`.
    pub fn build_with<H: KeyHash, E: KeyEq, M: MemoryManager>(
        self,
        memory: M,
    ) -> Result<CpuHashmap<H, E, M>> {
        CpuHashmap::with_config(self, memory)
    }
}

/// Creates a hashmap for `config.device`, picking the backend that serves it.
///
/// Only host memory has a backend; other devices fail with
/// [`Error::UnsupportedDevice`].
pub fn create_hashmap<H, E>(config: HashmapConfig) -> Result<Box<dyn Hashmap>>
where
    H: KeyHash + 'static,
    E: KeyEq + 'static,
{
    match config.device.device_type() {
        DeviceType::Cpu => Ok(Box::new(config.build::<H, E>()?)),
        DeviceType::Cuda => Err(Error::UnsupportedDevice(config.device)),
    }
}
