use alloc::vec::Vec;

/// Stable identifier of one entry in a hashmap.
///
/// An id pairs a slot index with the generation of the slot at the time the
/// entry was stored, so an id outliving its entry resolves to nothing rather
/// than to whatever reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

impl EntryId {
    /// Slot index of the entry.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the entry was stored.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Generational slab owning the values of a hashmap.
pub(crate) struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    index_limit: u32,
}

impl<T> SlotArena<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
            index_limit: u32::MAX,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_index_limit(index_limit: u32) -> Self {
        Self {
            index_limit,
            ..Self::with_capacity(0)
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores `value`, reusing the most recently vacated slot if any.
    ///
    /// Hands `value` back once every slot index is taken.
    pub(crate) fn insert(&mut self, value: T) -> Result<EntryId, T> {
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let Slot::Vacant {
                generation,
                next_free,
            } = *slot
            else {
                unreachable!("free list points at an occupied slot");
            };

            self.free_head = next_free;
            *slot = Slot::Occupied { generation, value };
            self.len += 1;
            return Ok(EntryId { index, generation });
        }

        let Some(index) = u32::try_from(self.slots.len())
            .ok()
            .filter(|index| *index < self.index_limit)
        else {
            return Err(value);
        };
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        self.len += 1;
        Ok(EntryId {
            index,
            generation: 0,
        })
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntryId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    EntryId {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    /// Vacates every slot and returns the values that were stored.
    ///
    /// Slots keep their storage and advance their generation, so ids issued
    /// before the drain stop resolving.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len);

        for index in (0..self.slots.len()).rev() {
            let generation = match self.slots[index] {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => generation,
            };
            let vacant = Slot::Vacant {
                generation,
                next_free: self.free_head,
            };

            if let Slot::Occupied { value, .. } = core::mem::replace(&mut self.slots[index], vacant)
            {
                drained.push(value);
            }
            self.free_head = Some(index as u32);
        }

        self.len = 0;
        drained
    }
}
