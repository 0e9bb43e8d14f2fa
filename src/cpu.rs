//! Host memory backend.

use alloc::vec::Vec;
use core::fmt::Debug;

use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::batch::BatchResult;
use crate::batch::EntryHandle;
use crate::batch::record_count;
use crate::config::AllocFailurePolicy;
use crate::config::HashmapConfig;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::functor::DefaultHash;
use crate::functor::DefaultKeyEq;
use crate::functor::KeyEq;
use crate::functor::KeyHash;
use crate::hashmap::Hashmap;
use crate::memory::CpuMemoryManager;
use crate::memory::MemoryManager;
use crate::store::Entry;
use crate::store::EntryStore;
use crate::store::Rejected;

/// A batched hashmap whose entries live in host memory.
///
/// `CpuHashmap<H, E, M>` hashes keys with `H`, compares them with `E` and
/// allocates its key and value buffers through `M`. Every buffer is released
/// exactly once, when the entry is cleared or the map is dropped.
///
/// The map is single-threaded: batched calls run to completion before
/// returning, and sharing a map across threads needs external locking.
pub struct CpuHashmap<H = DefaultHash, E = DefaultKeyEq, M: MemoryManager = CpuMemoryManager> {
    store: EntryStore<H, E>,
    memory: M,
    dsize_key: usize,
    dsize_value: usize,
    device: Device,
    on_alloc_failure: AllocFailurePolicy,
}

impl<H: KeyHash, E: KeyEq> CpuHashmap<H, E> {
    /// Creates an empty map sized for `capacity` entries of `dsize_key`-byte
    /// keys and `dsize_value`-byte values.
    ///
    /// Fails if `dsize_key` is zero or `device` is not host memory.
    pub fn new(
        capacity: usize,
        dsize_key: usize,
        dsize_value: usize,
        device: Device,
    ) -> Result<Self> {
        HashmapConfig::new(dsize_key, dsize_value)
            .with_capacity(capacity)
            .on_device(device)
            .build()
    }
}

impl<H: KeyHash, E: KeyEq, M: MemoryManager> CpuHashmap<H, E, M> {
    /// Creates an empty map from `config`, allocating through `memory`.
    pub fn with_config(config: HashmapConfig, memory: M) -> Result<Self> {
        config.validate()?;
        if !config.device.is_host() {
            return Err(Error::UnsupportedDevice(config.device));
        }

        debug!(
            capacity = config.capacity,
            dsize_key = config.dsize_key,
            dsize_value = config.dsize_value,
            device = %config.device,
            "creating host hashmap"
        );

        Ok(Self {
            store: EntryStore::with_capacity(config.capacity, config.dsize_key),
            memory,
            dsize_key: config.dsize_key,
            dsize_value: config.dsize_value,
            device: config.device,
            on_alloc_failure: config.on_alloc_failure,
        })
    }

    /// Copies one record pair into freshly allocated buffers.
    ///
    /// On failure nothing allocated here survives.
    fn duplicate(&self, key: &[u8], value: &[u8]) -> Result<Entry> {
        let device = &self.device;

        let mut key_buffer = self.memory.malloc(self.dsize_key, device)?;
        let mut value_buffer = match self.memory.malloc(self.dsize_value, device) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.memory.free(key_buffer, device);
                return Err(err);
            }
        };

        let copied = self
            .memory
            .memcpy(&mut key_buffer, device, key, device)
            .and_then(|()| self.memory.memcpy(&mut value_buffer, device, value, device));

        let entry = Entry {
            key: key_buffer,
            value: value_buffer,
        };
        match copied {
            Ok(()) => Ok(entry),
            Err(err) => {
                self.release(entry);
                Err(err)
            }
        }
    }

    /// Number of records in a batch, checking that both slices agree.
    fn batch_len(&self, keys: &[u8], values: &[u8]) -> Result<usize> {
        let n = record_count("keys", keys, self.dsize_key)?;
        let m = record_count("values", values, self.dsize_value)?;
        if self.dsize_value != 0 && m != n {
            return Err(Error::BatchLength { keys: n, values: m });
        }
        Ok(n)
    }
}

impl<H, E, M: MemoryManager> CpuHashmap<H, E, M> {
    /// The memory manager buffers are allocated through.
    pub fn memory_manager(&self) -> &M {
        &self.memory
    }

    /// Iterates over every live entry as `(handle, key, value)`, in no
    /// particular order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryHandle, &[u8], &[u8])> {
        self.store.iter().map(|(id, entry)| {
            (
                EntryHandle::new(id),
                entry.key.as_slice(),
                entry.value.as_slice(),
            )
        })
    }

    fn release(&self, entry: Entry) {
        self.memory.free(entry.key, &self.device);
        self.memory.free(entry.value, &self.device);
    }

    fn release_all(&mut self) -> usize {
        let entries = self.store.drain();
        let released = entries.len();
        for entry in entries {
            self.release(entry);
        }
        released
    }
}

impl<H: KeyHash, E: KeyEq, M: MemoryManager> Hashmap for CpuHashmap<H, E, M> {
    fn insert(&mut self, keys: &[u8], values: &[u8]) -> Result<BatchResult> {
        let n = self.batch_len(keys, values)?;
        let (dsize_key, dsize_value) = (self.dsize_key, self.dsize_value);

        let mut result = BatchResult::with_capacity(n);
        for i in 0..n {
            let key = &keys[i * dsize_key..(i + 1) * dsize_key];
            let value = &values[i * dsize_value..(i + 1) * dsize_value];

            let entry = match self.duplicate(key, value) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(index = i, error = %err, "failed to duplicate record");
                    match self.on_alloc_failure {
                        AllocFailurePolicy::Skip => {
                            result.push(EntryHandle::EMPTY);
                            continue;
                        }
                        AllocFailurePolicy::Abort => return Err(err),
                    }
                }
            };

            match self.store.try_insert(entry) {
                Ok(id) => result.push(EntryHandle::new(id)),
                Err(Rejected::Duplicate(entry)) => {
                    self.release(entry);
                    result.push(EntryHandle::EMPTY);
                }
                Err(Rejected::Full(entry)) => {
                    self.release(entry);
                    let err = Error::CapacityExceeded {
                        len: self.store.len(),
                    };
                    warn!(index = i, error = %err, "failed to store record");
                    match self.on_alloc_failure {
                        AllocFailurePolicy::Skip => result.push(EntryHandle::EMPTY),
                        AllocFailurePolicy::Abort => return Err(err),
                    }
                }
            }
        }

        trace!(batch = n, inserted = result.success_count(), "insert");
        Ok(result)
    }

    fn search(&self, keys: &[u8]) -> Result<BatchResult> {
        let n = record_count("keys", keys, self.dsize_key)?;

        let mut result = BatchResult::with_capacity(n);
        for key in keys.chunks_exact(self.dsize_key) {
            let handle = self
                .store
                .find(key)
                .map_or(EntryHandle::EMPTY, EntryHandle::new);
            result.push(handle);
        }

        trace!(batch = n, found = result.success_count(), "search");
        Ok(result)
    }

    fn remove(&mut self, keys: &[u8]) -> Result<Vec<u8>> {
        error!(
            batch = keys.len() / self.dsize_key,
            "remove is not implemented for host hashmaps"
        );
        Err(Error::UnsupportedOperation("remove"))
    }

    fn key(&self, handle: EntryHandle) -> Option<&[u8]> {
        let entry = self.store.get(handle.id()?)?;
        Some(entry.key.as_slice())
    }

    fn value(&self, handle: EntryHandle) -> Option<&[u8]> {
        let entry = self.store.get(handle.id()?)?;
        Some(entry.value.as_slice())
    }

    fn value_mut(&mut self, handle: EntryHandle) -> Option<&mut [u8]> {
        let entry = self.store.get_mut(handle.id()?)?;
        Some(entry.value.as_mut_slice())
    }

    fn clear(&mut self) {
        let released = self.release_all();
        debug!(released, "cleared host hashmap");
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn capacity(&self) -> usize {
        self.store.capacity()
    }

    fn dsize_key(&self) -> usize {
        self.dsize_key
    }

    fn dsize_value(&self) -> usize {
        self.dsize_value
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl<H, E, M: MemoryManager> Drop for CpuHashmap<H, E, M> {
    fn drop(&mut self) {
        let released = self.release_all();
        debug!(released, "dropped host hashmap");
    }
}

impl<H, E, M: MemoryManager> Debug for CpuHashmap<H, E, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (_, entry) in self.store.iter() {
            map.entry(&entry.key.as_slice(), &entry.value.as_slice());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::device::DeviceType;
    use crate::memory::DeviceBuffer;
    use crate::memory::TrackingMemoryManager;

    fn pack(records: &[u32]) -> Vec<u8> {
        records.iter().flat_map(|r| r.to_le_bytes()).collect()
    }

    fn read_u32(bytes: &[u8]) -> u32 {
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    fn tracked(
        memory: &TrackingMemoryManager,
    ) -> CpuHashmap<DefaultHash, DefaultKeyEq, &TrackingMemoryManager> {
        HashmapConfig::new(4, 4)
            .with_capacity(16)
            .build_with(memory)
            .unwrap()
    }

    #[test]
    fn insert_then_search_scenario() {
        let mut map: CpuHashmap = CpuHashmap::new(16, 4, 4, Device::cpu()).unwrap();

        let inserted = map.insert(&pack(&[1, 2, 1]), &pack(&[10, 20, 30])).unwrap();
        assert_eq!(inserted.masks(), &[1, 1, 0]);
        assert!(!inserted.handles()[0].is_empty());
        assert!(!inserted.handles()[1].is_empty());
        assert_eq!(inserted.handles()[2], EntryHandle::EMPTY);
        assert_eq!(map.len(), 2);

        let found = map.search(&pack(&[2])).unwrap();
        assert_eq!(found.masks(), &[1]);
        assert_eq!(found.handles()[0], inserted.handles()[1]);
        assert_eq!(read_u32(map.value(found.handles()[0]).unwrap()), 20);
        assert_eq!(read_u32(map.key(found.handles()[0]).unwrap()), 2);

        let missing = map.search(&pack(&[3])).unwrap();
        assert_eq!(missing.masks(), &[0]);
        assert_eq!(missing.handles()[0], EntryHandle::EMPTY);
        assert!(map.value(missing.handles()[0]).is_none());
    }

    #[test]
    fn first_occurrence_in_batch_wins() {
        let mut map: CpuHashmap = CpuHashmap::new(0, 4, 4, Device::cpu()).unwrap();

        let inserted = map.insert(&pack(&[7, 7]), &pack(&[1, 2])).unwrap();
        assert_eq!(inserted.masks(), &[1, 0]);
        assert_eq!(map.len(), 1);

        let found = map.search(&pack(&[7])).unwrap();
        assert_eq!(read_u32(map.value(found.handles()[0]).unwrap()), 1);

        // An existing key is not overwritten by a later batch either.
        let again = map.insert(&pack(&[7]), &pack(&[3])).unwrap();
        assert_eq!(again.masks(), &[0]);
        assert_eq!(read_u32(map.value(found.handles()[0]).unwrap()), 1);
    }

    #[test]
    fn failed_elements_leave_no_buffers() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);

        let inserted = map
            .insert(&pack(&[1, 2, 1, 3, 2, 2]), &pack(&[0; 6]))
            .unwrap();
        assert_eq!(inserted.success_count(), 3);
        assert_eq!(memory.live_buffers(), 2 * 3);
        assert_eq!(memory.total_allocations(), 2 * 6);

        map.search(&pack(&[1, 2, 3, 4])).unwrap();
        assert_eq!(memory.total_allocations(), 2 * 6);

        drop(map);
        assert_eq!(memory.live_buffers(), 0);
    }

    #[test]
    fn allocation_failure_skips_element() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);

        // Element 0 gets both buffers, element 1 only its key, element 2 nothing.
        memory.set_fail_after(Some(3));
        let inserted = map.insert(&pack(&[1, 2, 3]), &pack(&[10, 20, 30])).unwrap();
        assert_eq!(inserted.masks(), &[1, 0, 0]);
        assert_eq!(memory.live_buffers(), 2);
        assert_eq!(map.len(), 1);

        memory.set_fail_after(None);
        let retried = map.insert(&pack(&[2, 3]), &pack(&[20, 30])).unwrap();
        assert_eq!(retried.masks(), &[1, 1]);
        assert_eq!(memory.live_buffers(), 6);
    }

    #[test]
    fn allocation_failure_aborts_batch() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map: CpuHashmap<DefaultHash, DefaultKeyEq, _> = HashmapConfig::new(4, 4)
            .on_alloc_failure(AllocFailurePolicy::Abort)
            .build_with(&memory)
            .unwrap();

        memory.set_fail_after(Some(3));
        let err = map
            .insert(&pack(&[1, 2, 3]), &pack(&[10, 20, 30]))
            .unwrap_err();
        assert_eq!(
            err,
            Error::AllocationFailure {
                size: 4,
                device: Device::cpu()
            }
        );

        // Element 0 was committed before the failure and stays valid.
        assert_eq!(map.len(), 1);
        assert_eq!(memory.live_buffers(), 2);
        let found = map.search(&pack(&[1, 2])).unwrap();
        assert_eq!(found.masks(), &[1, 0]);
        assert_eq!(read_u32(map.value(found.handles()[0]).unwrap()), 10);
    }

    struct FailingCopy<'a>(&'a TrackingMemoryManager);

    impl MemoryManager for FailingCopy<'_> {
        fn malloc(&self, size: usize, device: &Device) -> Result<DeviceBuffer> {
            self.0.malloc(size, device)
        }

        fn free(&self, buffer: DeviceBuffer, device: &Device) {
            self.0.free(buffer, device)
        }

        fn memcpy(
            &self,
            _dst: &mut DeviceBuffer,
            dst_device: &Device,
            _src: &[u8],
            src_device: &Device,
        ) -> Result<()> {
            Err(Error::DeviceMismatch {
                dst: *dst_device,
                src: *src_device,
            })
        }
    }

    #[test]
    fn full_map_follows_failure_policy() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);
        map.store = EntryStore::with_index_limit(2, 4);

        let inserted = map.insert(&pack(&[1, 2, 3, 1]), &pack(&[0; 4])).unwrap();
        assert_eq!(inserted.masks(), &[1, 1, 0, 0]);
        assert_eq!(map.len(), 2);
        assert_eq!(memory.live_buffers(), 2 * 2);

        map.on_alloc_failure = AllocFailurePolicy::Abort;
        let err = map.insert(&pack(&[4, 5]), &pack(&[0; 2])).unwrap_err();
        assert_eq!(err, Error::CapacityExceeded { len: 2 });
        assert_eq!(memory.live_buffers(), 2 * 2);

        drop(map);
        assert_eq!(memory.live_buffers(), 0);
    }

    #[test]
    fn copy_failure_releases_both_buffers() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map: CpuHashmap<DefaultHash, DefaultKeyEq, _> = HashmapConfig::new(4, 4)
            .build_with(FailingCopy(&memory))
            .unwrap();

        let inserted = map.insert(&pack(&[1, 2]), &pack(&[10, 20])).unwrap();
        assert_eq!(inserted.masks(), &[0, 0]);
        assert_eq!(memory.total_allocations(), 4);
        assert_eq!(memory.live_buffers(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn remove_is_unsupported() {
        let mut map: CpuHashmap = CpuHashmap::new(4, 4, 4, Device::cpu()).unwrap();
        map.insert(&pack(&[1]), &pack(&[1])).unwrap();

        assert_eq!(
            map.remove(&pack(&[1])),
            Err(Error::UnsupportedOperation("remove"))
        );
        assert_eq!(
            map.remove(&pack(&[9])),
            Err(Error::UnsupportedOperation("remove"))
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn malformed_batches_are_rejected() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);

        assert_eq!(
            map.insert(&[0; 7], &[0; 8]),
            Err(Error::BatchShape {
                what: "keys",
                len: 7,
                stride: 4
            })
        );
        assert_eq!(
            map.insert(&[0; 8], &[0; 9]),
            Err(Error::BatchShape {
                what: "values",
                len: 9,
                stride: 4
            })
        );
        assert_eq!(
            map.insert(&[0; 8], &[0; 12]),
            Err(Error::BatchLength { keys: 2, values: 3 })
        );
        assert!(map.search(&[0; 3]).is_err());
        assert_eq!(memory.total_allocations(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn empty_batches_are_no_ops() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);

        let inserted = map.insert(&[], &[]).unwrap();
        assert!(inserted.is_empty());
        let found = map.search(&[]).unwrap();
        assert!(found.is_empty());
        assert_eq!(memory.total_allocations(), 0);
    }

    #[test]
    fn zero_sized_values_make_a_set() {
        let mut map: CpuHashmap = CpuHashmap::new(8, 4, 0, Device::cpu()).unwrap();

        let inserted = map.insert(&pack(&[5, 6, 5]), &[]).unwrap();
        assert_eq!(inserted.masks(), &[1, 1, 0]);
        assert_eq!(map.value(inserted.handles()[0]), Some(&[][..]));
        assert!(map.insert(&pack(&[8]), &[1]).is_err());
    }

    #[test]
    fn values_can_be_updated_in_place() {
        let mut map: CpuHashmap = CpuHashmap::new(8, 4, 4, Device::cpu()).unwrap();
        let inserted = map.insert(&pack(&[1]), &pack(&[100])).unwrap();
        let handle = inserted.handles()[0];

        map.value_mut(handle)
            .unwrap()
            .copy_from_slice(&101u32.to_le_bytes());

        let found = map.search(&pack(&[1])).unwrap();
        assert_eq!(read_u32(map.value(found.handles()[0]).unwrap()), 101);
        assert!(map.value_mut(EntryHandle::EMPTY).is_none());
    }

    #[test]
    fn stored_buffers_do_not_alias_inputs() {
        let mut map: CpuHashmap = CpuHashmap::new(8, 4, 4, Device::cpu()).unwrap();
        let mut keys = pack(&[1]);
        let mut values = pack(&[2]);
        let inserted = map.insert(&keys, &values).unwrap();

        keys.fill(0xFF);
        values.fill(0xFF);
        let handle = inserted.handles()[0];
        assert_eq!(read_u32(map.key(handle).unwrap()), 1);
        assert_eq!(read_u32(map.value(handle).unwrap()), 2);
        assert_ne!(map.key(handle).unwrap().as_ptr(), keys.as_ptr());
    }

    #[test]
    fn clear_releases_entries_and_invalidates_handles() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);

        let inserted = map.insert(&pack(&[1, 2, 3]), &pack(&[1, 2, 3])).unwrap();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(memory.live_buffers(), 0);
        for handle in inserted.handles() {
            assert!(map.key(*handle).is_none());
            assert!(map.value(*handle).is_none());
        }

        let again = map.insert(&pack(&[1]), &pack(&[9])).unwrap();
        assert_eq!(again.masks(), &[1]);
        assert_ne!(again.handles()[0], inserted.handles()[0]);
        assert!(map.value(inserted.handles()[0]).is_none());
    }

    #[test]
    fn rejects_non_host_devices() {
        let cuda = Device::new(DeviceType::Cuda, 0);
        let err = CpuHashmap::<DefaultHash, DefaultKeyEq>::new(4, 4, 4, cuda).unwrap_err();
        assert_eq!(err, Error::UnsupportedDevice(cuda));
    }

    #[test]
    fn iter_and_debug_cover_live_entries() {
        let mut map: CpuHashmap = CpuHashmap::new(8, 1, 1, Device::cpu()).unwrap();
        map.insert(&[1, 2, 1], &[10, 20, 30]).unwrap();

        let mut entries: Vec<(u8, u8)> = map.iter().map(|(_, k, v)| (k[0], v[0])).collect();
        entries.sort_unstable();
        assert_eq!(entries, [(1, 10), (2, 20)]);

        let debug = format!("{map:?}");
        assert!(debug.contains("[1]: [10]"), "{debug}");
        assert!(debug.contains("[2]: [20]"), "{debug}");
    }

    struct SipKeyHash {
        dsize_key: usize,
    }

    impl KeyHash for SipKeyHash {
        fn new(dsize_key: usize) -> Self {
            Self { dsize_key }
        }

        fn dsize_key(&self) -> usize {
            self.dsize_key
        }

        fn hash(&self, key: &[u8]) -> u64 {
            let mut hasher = SipHasher::new_with_keys(0x0706_0504_0302_0100, 0x0f0e_0d0c_0b0a_0908);
            hasher.write(&key[..self.dsize_key]);
            hasher.finish()
        }
    }

    #[test]
    fn custom_functors_plug_in() {
        let mut map: CpuHashmap<SipKeyHash, DefaultKeyEq> =
            CpuHashmap::new(0, 3, 2, Device::cpu()).unwrap();

        let inserted = map.insert(b"abcabddefabc", b"01234567").unwrap();
        assert_eq!(inserted.masks(), &[1, 1, 1, 0]);

        let found = map.search(b"defxyz").unwrap();
        assert_eq!(found.masks(), &[1, 0]);
        assert_eq!(map.value(found.handles()[0]), Some(&b"45"[..]));
    }

    #[test]
    fn random_batches_match_reference_map() {
        let memory = TrackingMemoryManager::new(CpuMemoryManager);
        let mut map = tracked(&memory);
        let mut reference: hashbrown::HashMap<u32, u32> = hashbrown::HashMap::new();
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        for _ in 0..32 {
            let len = rng.random_range(0..64);
            let keys: Vec<u32> = (0..len).map(|_| rng.random_range(0..512)).collect();
            let values: Vec<u32> = (0..len).map(|_| rng.random()).collect();

            let inserted = map.insert(&pack(&keys), &pack(&values)).unwrap();
            for (i, (key, value)) in keys.iter().zip(&values).enumerate() {
                let fresh = !reference.contains_key(key);
                if fresh {
                    reference.insert(*key, *value);
                }
                assert_eq!(inserted.masks()[i], u8::from(fresh), "key {key}");
            }
            assert_eq!(map.len(), reference.len());
            assert_eq!(memory.live_buffers(), 2 * reference.len());
        }

        let query: Vec<u32> = (0..600).collect();
        let found = map.search(&pack(&query)).unwrap();
        for ((key, handle), mask) in query.iter().zip(found.handles()).zip(found.masks()) {
            match reference.get(key) {
                Some(value) => {
                    assert_eq!(*mask, 1);
                    assert_eq!(read_u32(map.value(*handle).unwrap()), *value);
                }
                None => {
                    assert_eq!(*mask, 0);
                    assert!(handle.is_empty());
                }
            }
        }

        drop(map);
        assert_eq!(memory.live_buffers(), 0);
    }
}
