use alloc::vec::Vec;

use crate::arena::EntryId;
use crate::error::Error;
use crate::error::Result;

/// A non-owning reference to one entry of a hashmap.
///
/// Handles are resolved through the hashmap that issued them
/// ([`Hashmap::key`](crate::Hashmap::key), [`Hashmap::value`](crate::Hashmap::value)).
/// A handle whose entry has been released resolves to `None`.
/// [`EntryHandle::EMPTY`] stands for "no entry".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EntryHandle(Option<EntryId>);

impl EntryHandle {
    /// The handle reported for failed or missing elements.
    pub const EMPTY: Self = Self(None);

    pub(crate) fn new(id: EntryId) -> Self {
        Self(Some(id))
    }

    /// Returns `true` for the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// The id of the referenced entry, if any.
    pub fn id(&self) -> Option<EntryId> {
        self.0
    }
}

/// Per-element outcome of a batched insert or search.
///
/// Holds one handle and one mask byte per input record, in input order. The
/// mask is `1` where the element succeeded (inserted or found) and `0`
/// otherwise; the handle is [`EntryHandle::EMPTY`] wherever the mask is `0`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
    handles: Vec<EntryHandle>,
    masks: Vec<u8>,
}

impl BatchResult {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
            masks: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, handle: EntryHandle) {
        self.masks.push(u8::from(!handle.is_empty()));
        self.handles.push(handle);
    }

    /// Number of elements in the batch.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` for the result of an empty batch.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// One handle per element.
    pub fn handles(&self) -> &[EntryHandle] {
        &self.handles
    }

    /// One mask byte per element.
    pub fn masks(&self) -> &[u8] {
        &self.masks
    }

    /// Number of elements whose mask is set.
    pub fn success_count(&self) -> usize {
        self.masks.iter().filter(|&&m| m != 0).count()
    }

    /// Iterates over `(handle, mask)` pairs in input order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryHandle, u8)> + '_ {
        self.handles.iter().copied().zip(self.masks.iter().copied())
    }

    /// Splits the result into its handle and mask vectors.
    pub fn into_parts(self) -> (Vec<EntryHandle>, Vec<u8>) {
        (self.handles, self.masks)
    }
}

/// Number of `stride`-byte records packed in `bytes`.
pub(crate) fn record_count(what: &'static str, bytes: &[u8], stride: usize) -> Result<usize> {
    if stride == 0 {
        return if bytes.is_empty() {
            Ok(0)
        } else {
            Err(Error::BatchShape {
                what,
                len: bytes.len(),
                stride,
            })
        };
    }
    if bytes.len() % stride != 0 {
        return Err(Error::BatchShape {
            what,
            len: bytes.len(),
            stride,
        });
    }
    Ok(bytes.len() / stride)
}
