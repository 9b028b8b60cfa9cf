use std::sync::Arc;

use crate::{
    chain::BufferPool,
    error::DecodeError,
    node::{Cursor, NodeTree, Resolver},
    options::DecodeFlags,
    pool::Poolable,
    reader::Reader,
    registry::Registry,
    tokenizer::{Format, JsonTokenizer, KatTokenizer, Scratch, Tokenizer, XmlTokenizer},
    types::{self, TypeRef},
    value::Value,
};

/// Everything one decode needs besides the worker itself.
///
/// # Examples
///
/// ```rust
/// use katcodec::{BufferPool, BufferOptions, Format, Request, TypeRegistry, Value, Worker};
/// use std::sync::Arc;
///
/// let pool = Arc::new(BufferPool::new(&BufferOptions::default()).unwrap());
/// let registry = TypeRegistry::with_builtins();
/// let mut worker = Worker::new(pool, 64);
///
/// let request = Request::new().reader("i(42)").registry(&registry);
/// assert_eq!(worker.decode(Format::Kat, request).unwrap(), Value::Int(42));
/// ```
pub struct Request<'a> {
    reader: Option<Box<dyn Reader + 'a>>,
    registry: Option<&'a dyn Registry>,
    target: TypeRef,
    flags: DecodeFlags,
}

impl Default for Request<'_> {
    fn default() -> Self {
        Self {
            reader: None,
            registry: None,
            target: TypeRef::Any,
            flags: DecodeFlags::default(),
        }
    }
}

impl<'a> Request<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source of the document. Anything convertible into a [`Reader`]
    /// works, including `&str` and `&[u8]`.
    #[must_use]
    pub fn reader(mut self, reader: impl IntoReader<'a>) -> Self {
        self.reader = Some(reader.into_reader());
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: &'a dyn Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Type the root value must have. Defaults to [`TypeRef::Any`], which
    /// picks the root adapter by the document's outermost name.
    #[must_use]
    pub fn target(mut self, target: TypeRef) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: DecodeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Resolves `unknown` against this request's target type.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Configuration`] without a registry, otherwise whatever
    /// [`types::locate`] reports.
    pub fn locate(&self, unknown: &TypeRef) -> Result<TypeRef, DecodeError> {
        let registry = self
            .registry
            .ok_or(DecodeError::Configuration("request has no registry"))?;
        types::locate(unknown, &self.target, registry)
    }
}

impl core::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Request")
            .field("reader", &self.reader.is_some())
            .field("registry", &self.registry.is_some())
            .field("target", &self.target)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Conversion into the boxed reader a [`Request`] carries.
pub trait IntoReader<'a> {
    fn into_reader(self) -> Box<dyn Reader + 'a>;
}

impl<'a, R: Reader + 'a> IntoReader<'a> for R {
    fn into_reader(self) -> Box<dyn Reader + 'a> {
        Box::new(self)
    }
}

impl<'a> IntoReader<'a> for &'a str {
    fn into_reader(self) -> Box<dyn Reader + 'a> {
        Box::new(crate::reader::SliceReader::from(self))
    }
}

impl<'a> IntoReader<'a> for &'a [u8] {
    fn into_reader(self) -> Box<dyn Reader + 'a> {
        Box::new(crate::reader::SliceReader::new(self))
    }
}

/// Reusable decode orchestrator.
///
/// A worker owns the scratch chains, one tokenizer per format (the
/// non-default ones are built on first use) and the node tree. It runs one
/// decode at a time; [`ObjectPool`](crate::ObjectPool) hands workers out to
/// concurrent callers.
#[derive(Debug)]
pub struct Worker {
    pool: Arc<BufferPool>,
    window: usize,
    scratch: Scratch,
    kat: KatTokenizer,
    json: Option<JsonTokenizer>,
    xml: Option<XmlTokenizer>,
    tree: NodeTree,
    locked: bool,
}

impl Worker {
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, window: usize) -> Self {
        tracing::debug!(target: "katcodec::worker", window, "creating worker");
        Self {
            scratch: Scratch::new(&pool),
            kat: KatTokenizer::new(pool.clone(), window),
            json: None,
            xml: None,
            tree: NodeTree::new(),
            locked: false,
            pool,
            window,
        }
    }

    /// Decodes one document.
    ///
    /// The reader is closed, the tokenizer reset, open nodes unwound and
    /// scratch storage released before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::Configuration`] if the request has no reader or no
    ///   registry;
    /// - [`DecodeError::EmptyResult`] if the input held no root value;
    /// - any tokenizer, adapter or reader error.
    pub fn decode(&mut self, format: Format, request: Request<'_>) -> Result<Value, DecodeError> {
        let Request {
            reader,
            registry,
            target,
            flags,
        } = request;
        let Some(reader) = reader else {
            return Err(DecodeError::Configuration("request has no reader"));
        };
        let mut session = Session {
            worker: self,
            reader,
        };
        let Some(registry) = registry else {
            return Err(DecodeError::Configuration("request has no registry"));
        };
        session.run(format, Resolver { registry, flags }, &target)
    }

    /// Marks the worker busy. Returns `false` if it already was.
    pub fn lock(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        true
    }

    /// Clears per-decode state and marks the worker idle. Returns `false`
    /// if it was not busy.
    pub fn unlock(&mut self) -> bool {
        if !self.locked {
            return false;
        }
        self.clear();
        self.locked = false;
        true
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Drops every piece of per-decode state.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.scratch.release();
        self.kat.reset();
        if let Some(json) = &mut self.json {
            json.reset();
        }
        if let Some(xml) = &mut self.xml {
            xml.reset();
        }
    }
}

impl Poolable for Worker {
    fn lock(&mut self) -> bool {
        Worker::lock(self)
    }

    fn unlock(&mut self) -> bool {
        Worker::unlock(self)
    }
}

/// One decode in progress; cleans the worker up when dropped.
struct Session<'w, 'r> {
    worker: &'w mut Worker,
    reader: Box<dyn Reader + 'r>,
}

impl Session<'_, '_> {
    fn run(&mut self, format: Format, resolver: Resolver<'_>, target: &TypeRef) -> Result<Value, DecodeError> {
        tracing::debug!(target: "katcodec::worker", ?format, %target, "decoding");
        let worker = &mut *self.worker;
        let tokenizer: &mut dyn Tokenizer = match format {
            Format::Kat => &mut worker.kat,
            Format::Json => worker
                .json
                .get_or_insert_with(|| JsonTokenizer::new(worker.pool.clone(), worker.window)),
            Format::Xml => worker
                .xml
                .get_or_insert_with(|| XmlTokenizer::new(worker.pool.clone(), worker.window)),
        };
        let mut cursor = Cursor::new(&mut worker.tree, resolver, target);
        let outcome = tokenizer.read(&mut *self.reader, &mut worker.scratch, &mut cursor);
        let open = cursor.current().is_some();
        if outcome.is_err() || open {
            cursor.unwind();
        }
        outcome?;
        if open {
            return Err(DecodeError::malformed(0, "input ended inside a composite"));
        }
        worker.tree.take_result().ok_or(DecodeError::EmptyResult)
    }
}

impl Drop for Session<'_, '_> {
    fn drop(&mut self) {
        self.reader.close();
        self.worker.clear();
        tracing::debug!(target: "katcodec::worker", "decode finished");
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;
    use crate::{
        options::BufferOptions,
        reader::SliceReader,
        registry::TypeRegistry,
    };

    fn worker() -> Worker {
        let pool = Arc::new(BufferPool::new(&BufferOptions::default()).unwrap());
        Worker::new(pool, 8)
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_record("User", [("id", TypeRef::named("i")), ("name", TypeRef::named("s"))]);
        registry
    }

    /// Counts `close` calls so tests can check the reader is always closed.
    struct Tracked<'a> {
        inner: SliceReader<'a>,
        closed: &'a mut usize,
    }

    impl Reader for Tracked<'_> {
        fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.fill(buf)
        }

        fn close(&mut self) {
            *self.closed += 1;
            self.inner.close();
        }
    }

    #[rstest]
    #[case(Format::Kat, "User{i:id(1)s:name(kraity)}")]
    #[case(Format::Json, r#"{"id":1,"name":"kraity"}"#)]
    #[case(Format::Xml, "<User><id>1</id><name>kraity</name></User>")]
    fn user_in_every_format(#[case] format: Format, #[case] input: &str) {
        let registry = registry();
        let mut worker = worker();
        let request = Request::new()
            .reader(input)
            .registry(&registry)
            .target(TypeRef::named("User"));
        let user = worker.decode(format, request).unwrap();
        assert_eq!(user.get("id"), Some(&Value::Int(1)));
        assert_eq!(user.get("name"), Some(&Value::from("kraity")));
    }

    #[test]
    fn missing_parts_are_configuration_errors() {
        let registry = registry();
        let mut worker = worker();
        assert!(matches!(
            worker.decode(Format::Kat, Request::new().registry(&registry)),
            Err(DecodeError::Configuration(_))
        ));

        let mut closed = 0;
        let reader = Tracked {
            inner: SliceReader::from("i(1)"),
            closed: &mut closed,
        };
        assert!(matches!(
            worker.decode(Format::Kat, Request::new().reader(reader)),
            Err(DecodeError::Configuration(_))
        ));
        assert_eq!(closed, 1);
    }

    #[rstest]
    #[case("", true)]
    #[case("   \n", true)]
    #[case("User{i:id(1)", false)]
    #[case("User{i:id(x)}", false)]
    fn failures_close_reader_and_leave_worker_clean(#[case] input: &str, #[case] empty: bool) {
        let registry = registry();
        let mut worker = worker();
        let mut closed = 0;
        let reader = Tracked {
            inner: SliceReader::from(input),
            closed: &mut closed,
        };
        let request = Request::new().reader(reader).registry(&registry);
        let err = worker.decode(Format::Kat, request).unwrap_err();
        assert_eq!(matches!(err, DecodeError::EmptyResult), empty, "{err}");
        assert_eq!(closed, 1);
        assert_eq!(worker.tree.live(), 0);
        assert!(worker.tree.result().is_none());

        let request = Request::new().reader("i(7)").registry(&registry);
        assert_eq!(worker.decode(Format::Kat, request).unwrap(), Value::Int(7));
    }

    #[test]
    fn lock_is_exclusive() {
        let mut worker = worker();
        assert!(worker.lock());
        assert!(!worker.lock());
        assert!(worker.unlock());
        assert!(!worker.unlock());
    }

    #[test]
    fn request_locates_against_its_target() {
        use crate::types::TypeInfo;

        let mut registry = registry();
        registry.register_type(TypeInfo::new("IntBox").extends(TypeRef::generic("Box", [TypeRef::named("i")])));
        let request = Request::new().registry(&registry).target(TypeRef::named("IntBox"));
        assert_eq!(request.locate(&TypeRef::var("Box", 0)).unwrap(), TypeRef::named("i"));
        assert!(matches!(
            request.locate(&TypeRef::var("Pair", 1)),
            Err(DecodeError::UnresolvedType { .. })
        ));
    }
}
