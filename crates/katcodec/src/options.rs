use core::time::Duration;

use crate::error::DecodeError;

/// Sizing of the [`BufferPool`](crate::BufferPool) behind every
/// [`ByteChain`](crate::ByteChain) and tokenizer input window.
///
/// Requests are bucketed into size classes of `class_width` bytes. The first
/// `class_count` classes keep one retired array each; classes up to
/// `class_ceiling` are allocated without pooling; anything larger is refused
/// with [`DecodeError::CapacityExceeded`].
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    /// Number of pooled size classes.
    ///
    /// # Default
    ///
    /// `8`
    pub class_count: usize,

    /// Width of one size class in bytes.
    ///
    /// # Default
    ///
    /// `1024`
    pub class_width: usize,

    /// First class index that can no longer be allocated. Must not be smaller
    /// than `class_count`.
    ///
    /// # Default
    ///
    /// `16`
    pub class_ceiling: usize,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            class_count: 8,
            class_width: 1024,
            class_ceiling: 16,
        }
    }
}

impl BufferOptions {
    /// Checks the invariants between the three sizes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Configuration`] when a size is zero or the
    /// ceiling is below the pooled class count.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.class_count == 0 || self.class_width == 0 {
            return Err(DecodeError::Configuration(
                "buffer class count and width must be non-zero",
            ));
        }
        if self.class_ceiling < self.class_count {
            return Err(DecodeError::Configuration(
                "buffer class ceiling cannot be smaller than the class count",
            ));
        }
        Ok(())
    }

    /// Largest minimum size a [`BufferPool`](crate::BufferPool) built from
    /// these options can satisfy.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.class_ceiling
            .saturating_mul(self.class_width)
            .saturating_sub(1)
    }
}

/// Behaviour of the worker [`ObjectPool`](crate::ObjectPool).
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Number of idle workers kept, and the number created before borrowers
    /// start waiting.
    ///
    /// # Default
    ///
    /// `32`
    pub size: usize,

    /// Whether `borrow` waits for a returned worker once `size` workers are
    /// out. When `false` the pool creates extra workers instead.
    ///
    /// # Default
    ///
    /// `true`
    pub blocking: bool,

    /// Length of one wait before the idle stack is checked again.
    ///
    /// # Default
    ///
    /// `1000`
    pub wait_interval_ms: u64,

    /// Total time a blocked borrower waits before a fresh worker is created
    /// anyway.
    ///
    /// # Default
    ///
    /// `30000`
    pub borrow_timeout_ms: u64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            size: 32,
            blocking: true,
            wait_interval_ms: 1000,
            borrow_timeout_ms: 30_000,
        }
    }
}

impl WorkerOptions {
    #[must_use]
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    #[must_use]
    pub fn borrow_timeout(&self) -> Duration {
        Duration::from_millis(self.borrow_timeout_ms)
    }
}

/// Top-level configuration of a [`Codec`](crate::Codec).
///
/// # Examples
///
/// ```rust
/// use katcodec::{BufferOptions, CodecOptions};
///
/// let options = CodecOptions {
///     buffer: BufferOptions { class_count: 4, ..Default::default() },
///     ..Default::default()
/// };
/// assert!(options.validate().is_ok());
/// ```
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub buffer: BufferOptions,
    pub workers: WorkerOptions,

    /// Size of the chunk a tokenizer pulls from its reader at a time.
    ///
    /// # Default
    ///
    /// `1024`
    pub input_window: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            buffer: BufferOptions::default(),
            workers: WorkerOptions::default(),
            input_window: 1024,
        }
    }
}

impl CodecOptions {
    /// # Errors
    ///
    /// Returns [`DecodeError::Configuration`] for an invalid buffer layout, an
    /// empty worker pool, or an input window that is empty or larger than
    /// the buffer pool can allocate.
    pub fn validate(&self) -> Result<(), DecodeError> {
        self.buffer.validate()?;
        if self.workers.size == 0 {
            return Err(DecodeError::Configuration("worker pool size must be non-zero"));
        }
        if self.input_window == 0 {
            return Err(DecodeError::Configuration("input window must be non-zero"));
        }
        if self.input_window > self.buffer.limit() {
            return Err(DecodeError::Configuration(
                "input window exceeds the largest buffer the pool can allocate",
            ));
        }
        Ok(())
    }
}

/// Per-decode switches handed to every adapter.
///
/// # Default
///
/// All flags default to `false`, i.e. lenient decoding.
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeFlags {
    /// Reject structural names that no adapter or declared field accepts,
    /// instead of skipping their subtree.
    pub strict: bool,
}

impl DecodeFlags {
    #[must_use]
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = CodecOptions::default();
        assert_eq!(options.buffer.class_count, 8);
        assert_eq!(options.buffer.class_width, 1024);
        assert_eq!(options.buffer.class_ceiling, 16);
        assert_eq!(options.workers.size, 32);
        assert!(options.workers.blocking);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn ceiling_below_count_is_rejected() {
        let options = BufferOptions {
            class_count: 8,
            class_ceiling: 4,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(DecodeError::Configuration(_))));
    }

    #[test]
    fn limit_is_last_byte_below_ceiling() {
        let options = BufferOptions::default();
        assert_eq!(options.limit(), 16 * 1024 - 1);
        assert_eq!(options.limit(), crate::BufferPool::new(&options).unwrap().limit());
    }

    #[test]
    fn input_window_must_fit_the_pool() {
        let limit = BufferOptions::default().limit();
        let fits = CodecOptions {
            input_window: limit,
            ..CodecOptions::default()
        };
        assert!(fits.validate().is_ok());

        for input_window in [limit + 1, 20 * 1024] {
            let options = CodecOptions {
                input_window,
                ..CodecOptions::default()
            };
            assert!(
                matches!(options.validate(), Err(DecodeError::Configuration(_))),
                "{input_window}"
            );
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn options_deserialize_with_defaults() {
        let options: CodecOptions =
            serde_json::from_str(r#"{"workers":{"size":4,"blocking":false}}"#).unwrap();
        assert_eq!(options.workers.size, 4);
        assert!(!options.workers.blocking);
        assert_eq!(options.buffer, BufferOptions::default());
    }
}
