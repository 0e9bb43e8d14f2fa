use alloc::vec::Vec;

use hashbrown::HashTable;
use hashbrown::hash_table::Entry as TableEntry;

use crate::arena::EntryId;
use crate::arena::SlotArena;
use crate::functor::KeyEq;
use crate::functor::KeyHash;
use crate::memory::DeviceBuffer;

/// An owned key/value buffer pair.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) key: DeviceBuffer,
    pub(crate) value: DeviceBuffer,
}

/// Why an entry was handed back by [`EntryStore::try_insert`].
#[derive(Debug)]
pub(crate) enum Rejected {
    /// An equal key is already stored.
    Duplicate(Entry),
    /// No entry id is left to give out.
    Full(Entry),
}

/// Associative structure mapping owned keys to owned values.
///
/// Entries live in a slot arena; the hash table only holds their ids and
/// reaches the key bytes through the arena whenever it needs to hash or
/// compare. Growth of the table is left to `hashbrown`.
pub(crate) struct EntryStore<H, E> {
    index: HashTable<EntryId>,
    entries: SlotArena<Entry>,
    hash: H,
    eq: E,
}

impl<H, E> EntryStore<H, E> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.index.capacity()
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries.iter()
    }

    /// Empties the store and hands every entry back to the caller, which
    /// becomes responsible for releasing its buffers.
    pub(crate) fn drain(&mut self) -> Vec<Entry> {
        self.index.clear();
        self.entries.drain()
    }
}

impl<H: KeyHash, E: KeyEq> EntryStore<H, E> {
    pub(crate) fn with_capacity(capacity: usize, dsize_key: usize) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            entries: SlotArena::with_capacity(capacity),
            hash: H::new(dsize_key),
            eq: E::new(dsize_key),
        }
    }

    pub(crate) fn find(&self, key: &[u8]) -> Option<EntryId> {
        let Self {
            index,
            entries,
            hash,
            eq,
        } = self;

        index
            .find(hash.hash(key), |id| {
                entries
                    .get(*id)
                    .is_some_and(|stored| eq.eq(stored.key.as_slice(), key))
            })
            .copied()
    }

    #[cfg(test)]
    pub(crate) fn with_index_limit(index_limit: u32, dsize_key: usize) -> Self {
        Self {
            index: HashTable::new(),
            entries: SlotArena::with_index_limit(index_limit),
            hash: H::new(dsize_key),
            eq: E::new(dsize_key),
        }
    }

    /// Stores `entry` unless an equal key is already present or the store is
    /// full, in which case the entry is handed back untouched.
    pub(crate) fn try_insert(&mut self, entry: Entry) -> Result<EntryId, Rejected> {
        let Self {
            index,
            entries,
            hash,
            eq,
        } = self;
        let (hash, eq): (&H, &E) = (hash, eq);

        let key = entry.key.as_slice();
        let slot = index.entry(
            hash.hash(key),
            |id| {
                entries
                    .get(*id)
                    .is_some_and(|stored| eq.eq(stored.key.as_slice(), key))
            },
            |id| {
                entries
                    .get(*id)
                    .map_or(0, |stored| hash.hash(stored.key.as_slice()))
            },
        );

        match slot {
            TableEntry::Occupied(_) => Err(Rejected::Duplicate(entry)),
            TableEntry::Vacant(vacant) => match entries.insert(entry) {
                Ok(id) => {
                    vacant.insert(id);
                    Ok(id)
                }
                Err(entry) => Err(Rejected::Full(entry)),
            },
        }
    }
}
