use std::sync::Arc;

use crate::{
    chain::BufferPool,
    error::DecodeError,
    options::{CodecOptions, DecodeFlags},
    pool::ObjectPool,
    reader::{Reader, SliceReader},
    registry::Registry,
    tokenizer::Format,
    types::TypeRef,
    value::Value,
    worker::{Request, Worker},
};

/// Thread-safe entry point: one buffer pool, one worker pool and a shared
/// registry.
///
/// # Examples
///
/// ```rust
/// use katcodec::{Codec, CodecOptions, Format, TypeRef, TypeRegistry, Value};
///
/// let mut registry = TypeRegistry::with_builtins();
/// registry.register_record("User", [("id", TypeRef::named("i")), ("name", TypeRef::named("s"))]);
/// let codec = Codec::new(CodecOptions::default(), registry).unwrap();
///
/// let user = codec
///     .decode_str(Format::Kat, "User{i:id(1)s:name(kraity)}", TypeRef::named("User"))
///     .unwrap();
/// assert_eq!(user.get("name"), Some(&Value::from("kraity")));
/// ```
pub struct Codec {
    options: CodecOptions,
    buffers: Arc<BufferPool>,
    workers: ObjectPool<Worker>,
    registry: Arc<dyn Registry>,
}

impl Codec {
    /// # Errors
    ///
    /// [`DecodeError::Configuration`] when `options` fail validation.
    pub fn new(options: CodecOptions, registry: impl Registry + 'static) -> Result<Self, DecodeError> {
        Self::with_shared_registry(options, Arc::new(registry))
    }

    /// Like [`Codec::new`], for a registry that is shared with other codecs.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Configuration`] when `options` fail validation.
    pub fn with_shared_registry(options: CodecOptions, registry: Arc<dyn Registry>) -> Result<Self, DecodeError> {
        options.validate()?;
        let buffers = Arc::new(BufferPool::new(&options.buffer)?);
        let workers = {
            let buffers = Arc::clone(&buffers);
            let window = options.input_window;
            ObjectPool::new(&options.workers, move || Worker::new(Arc::clone(&buffers), window))
        };
        tracing::debug!(
            target: "katcodec::codec",
            workers = options.workers.size,
            blocking = options.workers.blocking,
            window = options.input_window,
            "created codec"
        );
        Ok(Self {
            options,
            buffers,
            workers,
            registry,
        })
    }

    /// Decodes the document in `reader` into a value of type `target`,
    /// leniently.
    ///
    /// # Errors
    ///
    /// See [`Worker::decode`].
    pub fn decode<'a>(&self, format: Format, reader: impl Reader + 'a, target: TypeRef) -> Result<Value, DecodeError> {
        self.decode_with(format, reader, target, DecodeFlags::default())
    }

    /// [`Codec::decode`] with explicit flags.
    ///
    /// # Errors
    ///
    /// See [`Worker::decode`].
    pub fn decode_with<'a>(
        &self,
        format: Format,
        reader: impl Reader + 'a,
        target: TypeRef,
        flags: DecodeFlags,
    ) -> Result<Value, DecodeError> {
        let request = Request::new()
            .reader(reader)
            .registry(&*self.registry)
            .target(target)
            .flags(flags);
        self.workers.lease().decode(format, request)
    }

    /// # Errors
    ///
    /// See [`Worker::decode`].
    pub fn decode_str(&self, format: Format, text: &str, target: TypeRef) -> Result<Value, DecodeError> {
        self.decode(format, SliceReader::from(text), target)
    }

    #[must_use]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    #[must_use]
    pub fn registry(&self) -> &dyn Registry {
        &*self.registry
    }

    #[must_use]
    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    #[must_use]
    pub fn workers(&self) -> &ObjectPool<Worker> {
        &self.workers
    }
}

impl core::fmt::Debug for Codec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Codec")
            .field("options", &self.options)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
