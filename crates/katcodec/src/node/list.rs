use crate::error::DecodeError;

/// Next capacity for a full list of `size` elements whose previous capacity
/// was `mark`.
///
/// Steps follow the Fibonacci sequence (`mark + size`) while that stays
/// within `limit`, then fall back to `size + 8`.
///
/// # Errors
///
/// [`DecodeError::CapacityExceeded`] when even `size + 8` would pass `limit`.
pub fn grow(size: usize, mark: usize, limit: usize) -> Result<usize, DecodeError> {
    if limit.checked_sub(mark).is_some_and(|room| room > size) {
        Ok(mark + size)
    } else if limit.checked_sub(8).is_some_and(|room| room >= size) {
        Ok(size + 8)
    } else {
        Err(DecodeError::CapacityExceeded {
            requested: size.saturating_add(8),
            limit,
        })
    }
}

/// Platform size limit for list storage.
pub(crate) const LIMIT: usize = isize::MAX as usize;

/// Growable element store with explicit Fibonacci growth.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Elements<T> {
    items: Vec<T>,
    size: usize,
    mark: usize,
}

impl<T> Elements<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::with_capacity(1),
            size: 1,
            mark: 1,
        }
    }

    /// Logical capacity, i.e. the slots reserved so far.
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.size
    }

    pub(crate) fn push(&mut self, item: T) -> Result<(), DecodeError> {
        if self.items.len() == self.size {
            let next = grow(self.size, self.mark, LIMIT)?;
            self.items.reserve_exact(next - self.items.len());
            self.mark = self.size;
            self.size = next;
        }
        self.items.push(item);
        Ok(())
    }

    pub(crate) fn into_vec(self) -> Vec<T> {
        self.items
    }
}
