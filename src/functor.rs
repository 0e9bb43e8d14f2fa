//! Hash and equality capabilities bound to a key length in bytes.
//!
//! A hashmap never learns the logical type of its keys. It only knows that
//! every key is `dsize_key` bytes long, and hashes and compares keys through
//! a [`KeyHash`] / [`KeyEq`] pair constructed with that length. Both read
//! exactly the first `dsize_key` bytes of the slices they are given and
//! ignore anything past them.

/// Hashes the first `dsize_key` bytes of a key.
pub trait KeyHash {
    /// Creates a hasher for keys of `dsize_key` bytes.
    fn new(dsize_key: usize) -> Self
    where
        Self: Sized;

    /// The key length this hasher was constructed with.
    fn dsize_key(&self) -> usize;

    /// Returns a deterministic digest of `key[..dsize_key]`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is shorter than `dsize_key`.
    fn hash(&self, key: &[u8]) -> u64;
}

/// Compares the first `dsize_key` bytes of two keys.
pub trait KeyEq {
    /// Creates a comparator for keys of `dsize_key` bytes.
    fn new(dsize_key: usize) -> Self
    where
        Self: Sized;

    /// The key length this comparator was constructed with.
    fn dsize_key(&self) -> usize;

    /// Returns `true` if `a[..dsize_key] == b[..dsize_key]`.
    ///
    /// # Panics
    ///
    /// Panics if either slice is shorter than `dsize_key`.
    fn eq(&self, a: &[u8], b: &[u8]) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        #[inline(always)]
        fn digest(bytes: &[u8]) -> u64 {
            use core::hash::BuildHasher;
            use core::hash::Hasher;

            let mut hasher = foldhash::fast::FixedState::default().build_hasher();
            hasher.write(bytes);
            hasher.finish()
        }
    } else {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        #[inline(always)]
        fn digest(bytes: &[u8]) -> u64 {
            bytes.iter().fold(FNV_OFFSET, |hash, &b| {
                (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
            })
        }
    }
}

/// General purpose byte hash.
///
/// Backed by `foldhash` with its fixed default seed when the `foldhash`
/// feature is on, FNV-1a otherwise. Digests are stable for the lifetime of
/// the process.
#[derive(Clone, Copy, Debug)]
pub struct DefaultHash {
    dsize_key: usize,
}

impl KeyHash for DefaultHash {
    fn new(dsize_key: usize) -> Self {
        Self { dsize_key }
    }

    fn dsize_key(&self) -> usize {
        self.dsize_key
    }

    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        digest(&key[..self.dsize_key])
    }
}

const COORDINATE_PRIMES: [u64; 3] = [73_856_093, 19_349_669, 83_492_791];

/// Spatial hash for keys made of packed little-endian `i32` lanes, such as
/// voxel coordinates.
///
/// Lane `i` is multiplied by one of three large primes (cycled) and the
/// products are folded together with a rotate-XOR. Trailing bytes that do
/// not fill a lane are folded in one at a time.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateHash {
    dsize_key: usize,
}

impl KeyHash for CoordinateHash {
    fn new(dsize_key: usize) -> Self {
        Self { dsize_key }
    }

    fn dsize_key(&self) -> usize {
        self.dsize_key
    }

    fn hash(&self, key: &[u8]) -> u64 {
        let key = &key[..self.dsize_key];
        let lanes = key.chunks_exact(4);
        let tail = lanes.remainder();

        let mut hash = lanes
            .zip(COORDINATE_PRIMES.iter().cycle())
            .fold(0u64, |hash, (lane, prime)| {
                let lane = i32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
                hash.rotate_left(21) ^ (lane as i64 as u64).wrapping_mul(*prime)
            });
        for &b in tail {
            hash = hash.rotate_left(8) ^ u64::from(b);
        }

        // The backing table tags buckets with the top bits of the digest.
        (hash ^ (hash >> 29)).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }
}

/// Byte-wise key equality.
#[derive(Clone, Copy, Debug)]
pub struct DefaultKeyEq {
    dsize_key: usize,
}

impl KeyEq for DefaultKeyEq {
    fn new(dsize_key: usize) -> Self {
        Self { dsize_key }
    }

    fn dsize_key(&self) -> usize {
        self.dsize_key
    }

    #[inline]
    fn eq(&self, a: &[u8], b: &[u8]) -> bool {
        a[..self.dsize_key] == b[..self.dsize_key]
    }
}
