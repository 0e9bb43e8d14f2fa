use alloc::vec::Vec;

use crate::batch::BatchResult;
use crate::batch::EntryHandle;
use crate::device::Device;
use crate::error::Result;

/// The batched key-value contract shared by every device backend.
///
/// Keys and values are opaque records of `dsize_key` and `dsize_value` bytes.
/// Batched calls take them packed back to back in one slice; the number of
/// elements is the slice length divided by the record size. Each element
/// succeeds or fails on its own and reports through its mask.
///
/// ```rust
/// # use record_hashmap::{CpuHashmap, Device, Hashmap};
/// let mut map: CpuHashmap = CpuHashmap::new(16, 4, 4, Device::cpu()).unwrap();
///
/// let keys: Vec<u8> = [1u32, 2, 1].iter().flat_map(|k| k.to_le_bytes()).collect();
/// let values: Vec<u8> = [10u32, 20, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
/// let inserted = map.insert(&keys, &values).unwrap();
/// assert_eq!(inserted.masks(), &[1, 1, 0]);
///
/// let found = map.search(&2u32.to_le_bytes()).unwrap();
/// assert_eq!(found.masks(), &[1]);
/// assert_eq!(map.value(found.handles()[0]), Some(&20u32.to_le_bytes()[..]));
/// ```
pub trait Hashmap {
    /// Inserts every record of `keys` with the record at the same position in
    /// `values`.
    ///
    /// The table copies accepted records into buffers it owns. An element
    /// whose key is already stored (including by an earlier element of the
    /// same batch) fails with mask `0` and leaves the stored value untouched.
    fn insert(&mut self, keys: &[u8], values: &[u8]) -> Result<BatchResult>;

    /// Looks up every record of `keys`. Never modifies the table.
    fn search(&self, keys: &[u8]) -> Result<BatchResult>;

    /// Removes every record of `keys`.
    ///
    /// No backend in this crate supports removal yet; they return
    /// [`Error::UnsupportedOperation`](crate::Error::UnsupportedOperation).
    fn remove(&mut self, keys: &[u8]) -> Result<Vec<u8>>;

    /// Key bytes of the entry referenced by `handle`.
    fn key(&self, handle: EntryHandle) -> Option<&[u8]>;

    /// Value bytes of the entry referenced by `handle`.
    fn value(&self, handle: EntryHandle) -> Option<&[u8]>;

    /// Mutable value bytes of the entry referenced by `handle`.
    fn value_mut(&mut self, handle: EntryHandle) -> Option<&mut [u8]>;

    /// Releases every entry. All outstanding handles stop resolving.
    fn clear(&mut self);

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Returns `true` if no entry is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries the backing structure holds before it grows.
    fn capacity(&self) -> usize;

    /// Size of a key record in bytes.
    fn dsize_key(&self) -> usize;

    /// Size of a value record in bytes.
    fn dsize_value(&self) -> usize;

    /// Device the entries live on.
    fn device(&self) -> &Device;
}
