use super::{NodeId, NodeTree, Resolver, Sink};
use crate::{
    chain::ByteChain,
    error::DecodeError,
    registry::Adapter,
    tokenizer::Visitor,
    types::TypeRef,
};

/// Drives a [`NodeTree`] from tokenizer events.
///
/// `current` is the innermost open node, or `None` while at the root. An
/// open descends into the new child, a close moves to whatever
/// [`NodeTree::close`] returns, so after the outermost close the cursor is
/// back at the root.
pub struct Cursor<'a> {
    tree: &'a mut NodeTree,
    resolver: Resolver<'a>,
    target: &'a TypeRef,
    current: Option<NodeId>,
}

impl<'a> Cursor<'a> {
    pub fn new(tree: &'a mut NodeTree, resolver: Resolver<'a>, target: &'a TypeRef) -> Self {
        Self {
            tree,
            resolver,
            target,
            current: None,
        }
    }

    /// Innermost open node, `None` at the root.
    #[must_use]
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Closes every open node without delivering values and returns to the
    /// root.
    pub fn unwind(&mut self) {
        if let Some(id) = self.current.take() {
            self.tree.unwind(id);
        }
    }

    /// Adapter and declared type for a root-level event. A missing adapter
    /// at the root is always an error, strict or not.
    fn root_adapter(&self, space: &ByteChain, alias: &ByteChain) -> Result<(TypeRef, std::sync::Arc<dyn Adapter>), DecodeError> {
        let (declared, adapter) = match self.target.key() {
            Some(key) => (self.target.clone(), self.resolver.registry.lookup(key)),
            None => {
                let name = space.to_string_lossy();
                (TypeRef::named(name.as_ref()), self.resolver.registry.lookup(&name))
            }
        };
        match adapter {
            Some(adapter) => Ok((declared, adapter)),
            None => Err(DecodeError::unknown_name(space.as_bytes(), alias.as_bytes())),
        }
    }
}

impl Visitor for Cursor<'_> {
    fn open(&mut self, space: &ByteChain, alias: &ByteChain) -> Result<bool, DecodeError> {
        if let Some(id) = self.current {
            return Ok(match self.tree.open_child(id, space, alias, self.resolver)? {
                Some(child) => {
                    self.current = Some(child);
                    true
                }
                None => false,
            });
        }

        let (declared, adapter) = self.root_adapter(space, alias)?;
        let Some(spec) = adapter.builder_for(&declared, self.resolver.registry) else {
            return Err(DecodeError::unknown_name(space.as_bytes(), alias.as_bytes()));
        };
        let id = self.tree.insert(spec, declared, adapter, String::new());
        self.tree.bind(id, Sink::Root)?;
        self.current = Some(id);
        Ok(true)
    }

    fn emit(&mut self, space: &ByteChain, alias: &ByteChain, value: &ByteChain) -> Result<(), DecodeError> {
        if let Some(id) = self.current {
            return self.tree.emit_scalar(id, space, alias, value, self.resolver);
        }

        let (_, adapter) = self.root_adapter(space, alias)?;
        let value = adapter.decode_scalar(self.resolver.flags, value)?;
        self.tree.set_result(value);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        let Some(id) = self.current else {
            return Err(DecodeError::malformed(0, "close without an open composite"));
        };
        // A failed close has already removed `id`; unwinding resumes at its parent.
        let parent = self.tree.parent(id);
        match self.tree.close(id, true) {
            Ok(next) => {
                self.current = next;
                Ok(())
            }
            Err(err) => {
                self.current = parent;
                Err(err)
            }
        }
    }
}
