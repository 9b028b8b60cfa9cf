//! Size-classed recycler for the raw storage behind [`ByteChain`].
//!
//! The pool keeps at most one retired array per size class. Handing an array
//! to the pool is a move: the caller gives up its `Box<[u8]>` and can no
//! longer observe it, so a reclaimed array can never be read through a stale
//! handle.
//!
//! [`ByteChain`]: crate::ByteChain

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::{error::DecodeError, options::BufferOptions};

/// Slot-per-class free list guarded by one pool-wide lock.
#[derive(Debug)]
pub struct BufferPool {
    class_count: usize,
    class_width: usize,
    class_ceiling: usize,
    slots: Mutex<Box<[Option<Box<[u8]>>]>>,
}

impl BufferPool {
    /// # Errors
    ///
    /// Returns [`DecodeError::Configuration`] if `options` fail
    /// [`BufferOptions::validate`].
    pub fn new(options: &BufferOptions) -> Result<Self, DecodeError> {
        options.validate()?;
        Ok(Self::with_layout(options))
    }

    fn with_layout(options: &BufferOptions) -> Self {
        Self {
            class_count: options.class_count,
            class_width: options.class_width,
            class_ceiling: options.class_ceiling,
            slots: Mutex::new((0..options.class_count).map(|_| None).collect()),
        }
    }

    /// Process-wide pool with the default [`BufferOptions`].
    pub fn shared() -> Arc<BufferPool> {
        static SHARED: OnceLock<Arc<BufferPool>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(Self::with_layout(&BufferOptions::default())))
            .clone()
    }

    #[must_use]
    pub fn class_width(&self) -> usize {
        self.class_width
    }

    /// Largest minimum size this pool can still satisfy.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.class_ceiling
            .saturating_mul(self.class_width)
            .saturating_sub(1)
    }

    fn slots(&self) -> MutexGuard<'_, Box<[Option<Box<[u8]>>]>> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upper boundary of class `index`, which is the length of every fresh
    /// array allocated for it.
    fn class_size(&self, index: usize) -> usize {
        (index + 1)
            .saturating_mul(self.class_width)
            .saturating_sub(1)
    }

    /// Returns an array of at least `min` bytes.
    ///
    /// # Errors
    ///
    /// [`DecodeError::CapacityExceeded`] when `min` falls in a class at or
    /// beyond the ceiling.
    pub fn alloc(&self, min: usize) -> Result<Box<[u8]>, DecodeError> {
        let index = min / self.class_width;

        if index < self.class_count {
            let retired = self.slots()[index].take();
            match retired {
                Some(data) if data.len() >= min => {
                    tracing::trace!(target: "katcodec::pool", class = index, min, "reused pooled buffer");
                    Ok(data)
                }
                _ => Ok(vec![0; self.class_size(index).max(min)].into_boxed_slice()),
            }
        } else if index < self.class_ceiling {
            tracing::debug!(
                target: "katcodec::pool",
                class = index,
                min,
                "allocating unpooled buffer"
            );
            Ok(vec![0; self.class_size(index).max(min)].into_boxed_slice())
        } else {
            Err(DecodeError::CapacityExceeded {
                requested: min,
                limit: self.limit(),
            })
        }
    }

    /// Replaces `*old` with an array of at least `min` bytes, carrying over
    /// its first `live` bytes and retiring the previous array into its own
    /// size class.
    ///
    /// On error `*old` is left untouched.
    ///
    /// # Errors
    ///
    /// [`DecodeError::CapacityExceeded`] as for [`alloc`](Self::alloc).
    pub fn acquire(&self, old: &mut Box<[u8]>, live: usize, min: usize) -> Result<(), DecodeError> {
        let mut data = self.alloc(min.max(live))?;
        let live = live.min(old.len());
        data[..live].copy_from_slice(&old[..live]);

        let previous = core::mem::replace(old, data);
        if !previous.is_empty() {
            self.release(previous);
        }
        Ok(())
    }

    /// Retires `array` into its size class, evicting whatever was there.
    /// Arrays too large for any pooled class are dropped.
    pub fn release(&self, array: Box<[u8]>) {
        let index = array.len() / self.class_width;
        if index < self.class_count {
            self.slots()[index] = Some(array);
        }
    }

    /// Retires `array` and hands back the array it displaced, if any.
    /// Arrays too large for any pooled class are returned unchanged.
    pub fn reclaim(&self, array: Box<[u8]>) -> Option<Box<[u8]>> {
        let index = array.len() / self.class_width;
        if index < self.class_count {
            self.slots()[index].replace(array)
        } else {
            Some(array)
        }
    }

    /// Number of classes currently holding a retired array.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.slots().iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;

    fn pool() -> BufferPool {
        BufferPool::new(&BufferOptions::default()).unwrap()
    }

    #[test]
    fn fresh_arrays_fill_their_class() {
        let pool = pool();
        assert_eq!(pool.alloc(10).unwrap().len(), 1023);
        assert_eq!(pool.alloc(1024).unwrap().len(), 2047);
    }

    #[test]
    fn released_arrays_are_reused() {
        let pool = pool();
        let array = pool.alloc(100).unwrap();
        let ptr = array.as_ptr();
        pool.release(array);
        assert_eq!(pool.retained(), 1);

        let again = pool.alloc(200).unwrap();
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn undersized_retired_array_is_not_handed_out() {
        let pool = pool();
        pool.release(vec![0; 16].into_boxed_slice());
        let array = pool.alloc(500).unwrap();
        assert!(array.len() >= 500);
    }

    #[test]
    fn classes_past_count_are_unpooled() {
        let pool = pool();
        let big = pool.alloc(10 * 1024).unwrap();
        assert_eq!(big.len(), 11 * 1024 - 1);
        pool.release(big);
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn ceiling_is_enforced() {
        let pool = pool();
        let err = pool.alloc(16 * 1024).unwrap_err();
        assert!(matches!(err, DecodeError::CapacityExceeded { requested, .. } if requested == 16 * 1024));
        assert!(pool.alloc(16 * 1024 - 1).is_ok());
    }

    #[test]
    fn acquire_moves_live_prefix_and_retires_old() {
        let pool = pool();
        let mut array: Box<[u8]> = b"kat.plus".to_vec().into_boxed_slice();
        pool.acquire(&mut array, 8, 2000).unwrap();
        assert!(array.len() >= 2000);
        assert_eq!(&array[..8], b"kat.plus");
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn failed_acquire_keeps_old_array() {
        let pool = pool();
        let mut array: Box<[u8]> = b"kat".to_vec().into_boxed_slice();
        assert!(pool.acquire(&mut array, 3, usize::MAX).is_err());
        assert_eq!(&*array, b"kat");
    }

    #[test]
    fn reclaim_swaps_occupant() {
        let pool = pool();
        let first = vec![1u8; 10].into_boxed_slice();
        let second = vec![2u8; 20].into_boxed_slice();
        assert!(pool.reclaim(first).is_none());
        let displaced = pool.reclaim(second).unwrap();
        assert_eq!(displaced.len(), 10);
    }

    #[test]
    fn invalid_layout_is_rejected() {
        let options = BufferOptions {
            class_count: 4,
            class_width: 0,
            class_ceiling: 8,
        };
        assert!(BufferPool::new(&options).is_err());
    }

    #[quickcheck]
    fn never_smaller_than_requested(min: u16) -> bool {
        let pool = pool();
        let min = usize::from(min);
        match pool.alloc(min) {
            Ok(array) => array.len() >= min,
            Err(DecodeError::CapacityExceeded { .. }) => min / 1024 >= 16,
            Err(_) => false,
        }
    }
}
