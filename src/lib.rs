#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod arena;
mod store;

/// Batch results and entry handles.
pub mod batch;

pub mod config;

pub mod cpu;

pub mod device;

pub mod error;

pub mod functor;

/// The device-independent batched hashmap contract.
pub mod hashmap;

pub mod memory;

pub use arena::EntryId;
pub use batch::BatchResult;
pub use batch::EntryHandle;
pub use config::AllocFailurePolicy;
pub use config::HashmapConfig;
pub use config::create_hashmap;
pub use cpu::CpuHashmap;
pub use device::Device;
pub use device::DeviceType;
pub use error::Error;
pub use error::Result;
pub use functor::CoordinateHash;
pub use functor::DefaultHash;
pub use functor::DefaultKeyEq;
pub use functor::KeyEq;
pub use functor::KeyHash;
pub use hashmap::Hashmap;
pub use memory::CpuMemoryManager;
pub use memory::DeviceBuffer;
pub use memory::MemoryManager;
pub use memory::TrackingMemoryManager;
