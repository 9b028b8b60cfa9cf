//! Arena of in-progress builder nodes.
//!
//! Every structural open creates one node in the [`NodeTree`]; every close
//! frees it and delivers the built value to its sink, which is either the
//! parent node or the root result. A node stores its parent's [`NodeId`], so
//! the chain of parent links is the decode stack and no call-stack recursion
//! is needed however deep the input nests.
//!
//! ```text
//!   insert ──► Unbound ──bind──► Active ──close──► Closed (slot freed)
//!                                  │  ▲
//!                     open_child   │  │ emit_child (on child close)
//!                     emit_scalar  ▼  │
//! ```

mod cursor;
pub mod list;

use std::sync::Arc;

pub use cursor::Cursor;

use self::list::Elements;
use crate::{
    chain::ByteChain,
    error::DecodeError,
    options::DecodeFlags,
    registry::{Adapter, Registry},
    types::{locate, TypeRef},
    value::{Map, Record, Value},
};

/// Kind of builder an adapter asks for, with its declared slot types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeSpec {
    /// One slot; the last value emitted wins.
    Scalar { inner: TypeRef },
    /// Exactly `slots.len()` positional slots.
    Tuple { slots: Vec<TypeRef> },
    List { element: TypeRef },
    /// Declared fields, matched by alias.
    Record {
        name: String,
        fields: Arc<[(String, TypeRef)]>,
    },
    /// Open record accepting every alias.
    Map { value: TypeRef },
}

/// Handle to a node slot. Stale handles are detected by generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// Where a node delivers its value when it closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sink {
    Root,
    Node(NodeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Unbound,
    Active,
    Closed,
}

/// Registry and flags a node consults when resolving child adapters.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub registry: &'a dyn Registry,
    pub flags: DecodeFlags,
}

#[derive(Debug)]
enum Build {
    Scalar {
        inner: TypeRef,
        value: Value,
    },
    Tuple {
        slots: Vec<TypeRef>,
        values: Vec<Value>,
        next: usize,
    },
    List {
        element: TypeRef,
        items: Elements<Value>,
    },
    Record {
        fields: Arc<[(String, TypeRef)]>,
        record: Record,
    },
    Map {
        value: TypeRef,
        entries: Map,
    },
}

impl Build {
    fn new(spec: NodeSpec) -> Self {
        match spec {
            NodeSpec::Scalar { inner } => Build::Scalar {
                inner,
                value: Value::Null,
            },
            NodeSpec::Tuple { slots } => Build::Tuple {
                values: vec![Value::Null; slots.len()],
                slots,
                next: 0,
            },
            NodeSpec::List { element } => Build::List {
                element,
                items: Elements::new(),
            },
            NodeSpec::Record { name, fields } => Build::Record {
                fields,
                record: Record::new(name),
            },
            NodeSpec::Map { value } => Build::Map {
                value,
                entries: Map::new(),
            },
        }
    }

    /// Declared type of the slot `key` lands in. `Ok(None)` for record
    /// fields that are not declared.
    fn slot(&self, key: &str) -> Result<Option<&TypeRef>, DecodeError> {
        Ok(match self {
            Build::Scalar { inner, .. } => Some(inner),
            Build::Tuple { slots, next, .. } => match slots.get(*next) {
                Some(slot) => Some(slot),
                None => return Err(DecodeError::ArityExceeded { arity: slots.len() }),
            },
            Build::List { element, .. } => Some(element),
            Build::Record { fields, .. } => fields.iter().find(|(name, _)| name == key).map(|(_, ty)| ty),
            Build::Map { value, .. } => Some(value),
        })
    }

    fn store(&mut self, key: String, v: Value) -> Result<(), DecodeError> {
        match self {
            Build::Scalar { value, .. } => *value = v,
            Build::Tuple { slots, values, next } => {
                let Some(slot) = values.get_mut(*next) else {
                    return Err(DecodeError::ArityExceeded { arity: slots.len() });
                };
                *slot = v;
                *next += 1;
            }
            Build::List { items, .. } => items.push(v)?,
            Build::Record { record, .. } => record.insert(key, v),
            Build::Map { entries, .. } => {
                entries.insert(key, v);
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Build::Scalar { value, .. } => value,
            Build::Tuple { values, .. } => Value::Tuple(values),
            Build::List { items, .. } => Value::List(items.into_vec()),
            Build::Record { record, .. } => Value::Record(record),
            Build::Map { entries, .. } => Value::Map(entries),
        }
    }
}

/// One in-progress composite.
#[derive(Debug)]
struct Node {
    build: Build,
    declared: TypeRef,
    adapter: Arc<dyn Adapter>,
    /// Key under which the finished value is stored in the sink.
    key: String,
    sink: Option<Sink>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of builder nodes plus the root result slot.
#[derive(Debug, Default)]
pub struct NodeTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    result: Option<Value>,
}

/// Incoming key of an event: the alias, or the space for unnamed items.
fn event_key(space: &ByteChain, alias: &ByteChain) -> String {
    if alias.is_empty() {
        space.to_string_lossy().into_owned()
    } else {
        alias.to_string_lossy().into_owned()
    }
}

impl NodeTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes not yet closed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn state(&self, id: NodeId) -> NodeState {
        match self.node(id) {
            Ok(Node { sink: None, .. }) => NodeState::Unbound,
            Ok(_) => NodeState::Active,
            Err(_) => NodeState::Closed,
        }
    }

    /// Parent of a live node, `None` for root and unbound nodes.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id) {
            Ok(Node {
                sink: Some(Sink::Node(parent)),
                ..
            }) => Some(*parent),
            _ => None,
        }
    }

    /// Adapter resolved for a live node.
    #[must_use]
    pub fn adapter(&self, id: NodeId) -> Option<&Arc<dyn Adapter>> {
        self.node(id).ok().map(|node| &node.adapter)
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }

    pub(crate) fn set_result(&mut self, value: Value) {
        self.result = Some(value);
    }

    fn node(&self, id: NodeId) -> Result<&Node, DecodeError> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(DecodeError::Configuration("node handle is no longer live"))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DecodeError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DecodeError::Configuration("node handle is no longer live"))
    }

    /// Adds an unbound node for a value of type `declared` built as `spec`,
    /// to be stored under `key` once finished.
    pub fn insert(&mut self, spec: NodeSpec, declared: TypeRef, adapter: Arc<dyn Adapter>, key: String) -> NodeId {
        let node = Node {
            build: Build::new(spec),
            declared,
            adapter,
            key,
            sink: None,
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    /// Attaches `id` to its sink. A node is bound exactly once.
    ///
    /// # Errors
    ///
    /// [`DecodeError::AlreadyBound`] on a second bind.
    pub fn bind(&mut self, id: NodeId, sink: Sink) -> Result<(), DecodeError> {
        let node = self.node_mut(id)?;
        if node.sink.is_some() {
            return Err(DecodeError::AlreadyBound);
        }
        node.sink = Some(sink);
        Ok(())
    }

    /// Picks the adapter and concrete type for an incoming `space`/`alias`
    /// under node `id`. `Ok(None)` means the event should be skipped.
    fn resolve(
        &self,
        id: NodeId,
        space: &ByteChain,
        alias: &ByteChain,
        resolver: Resolver<'_>,
    ) -> Result<Option<(TypeRef, Arc<dyn Adapter>)>, DecodeError> {
        let node = self.node(id)?;
        let key = event_key(space, alias);
        let Some(slot) = node.build.slot(&key)? else {
            return reject(resolver.flags, space, alias);
        };

        let slot = if slot.is_unresolved() {
            locate(slot, &node.declared, resolver.registry)?
        } else {
            slot.clone()
        };
        let (declared, adapter) = match slot.key() {
            Some(type_key) => (slot.clone(), resolver.registry.lookup(type_key)),
            None => {
                let name = space.to_string_lossy();
                (TypeRef::named(name.as_ref()), resolver.registry.lookup(&name))
            }
        };
        match adapter {
            Some(adapter) => Ok(Some((declared, adapter))),
            None => reject(resolver.flags, space, alias),
        }
    }

    /// Opens a composite child of `id`, already bound to it.
    ///
    /// Returns `Ok(None)` when no adapter (or no builder) exists for the
    /// child and decoding is lenient; the caller skips the subtree and stays
    /// on `id`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnknownName`] in strict mode where lenient mode would
    /// skip, [`DecodeError::ArityExceeded`] past the last tuple slot, and
    /// [`DecodeError::UnresolvedType`] from generic resolution.
    pub fn open_child(
        &mut self,
        id: NodeId,
        space: &ByteChain,
        alias: &ByteChain,
        resolver: Resolver<'_>,
    ) -> Result<Option<NodeId>, DecodeError> {
        let Some((declared, adapter)) = self.resolve(id, space, alias, resolver)? else {
            return Ok(None);
        };
        let Some(spec) = adapter.builder_for(&declared, resolver.registry) else {
            return reject(resolver.flags, space, alias);
        };
        let child = self.insert(spec, declared, adapter, event_key(space, alias));
        self.bind(child, Sink::Node(id))?;
        tracing::trace!(target: "katcodec::node", parent = id.index, child = child.index, "opened node");
        Ok(Some(child))
    }

    /// Decodes `raw` with the adapter resolved for the slot and stores it.
    ///
    /// # Errors
    ///
    /// As for [`open_child`](Self::open_child), plus whatever the adapter's
    /// `decode_scalar` reports.
    pub fn emit_scalar(
        &mut self,
        id: NodeId,
        space: &ByteChain,
        alias: &ByteChain,
        raw: &ByteChain,
        resolver: Resolver<'_>,
    ) -> Result<(), DecodeError> {
        let Some((_, adapter)) = self.resolve(id, space, alias, resolver)? else {
            return Ok(());
        };
        let value = adapter.decode_scalar(resolver.flags, raw)?;
        self.emit_child(id, event_key(space, alias), value)
    }

    /// Stores a finished child value under `key`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::ArityExceeded`] for a full tuple and
    /// [`DecodeError::CapacityExceeded`] for a list that cannot grow.
    pub fn emit_child(&mut self, id: NodeId, key: String, value: Value) -> Result<(), DecodeError> {
        self.node_mut(id)?.build.store(key, value)
    }

    /// Frees `id`. On success its value is delivered to the sink first.
    /// Returns the parent, or `None` for a root node.
    ///
    /// # Errors
    ///
    /// Whatever storing into the parent reports; the node is freed either
    /// way.
    pub fn close(&mut self, id: NodeId, success: bool) -> Result<Option<NodeId>, DecodeError> {
        let node = self.remove(id)?;
        let parent = match node.sink {
            Some(Sink::Node(parent)) => Some(parent),
            _ => None,
        };
        tracing::trace!(target: "katcodec::node", node = id.index, success, "closed node");
        if success {
            let value = node.build.finish();
            match node.sink {
                Some(Sink::Node(parent)) => self.emit_child(parent, node.key, value)?,
                Some(Sink::Root) => self.result = Some(value),
                None => {}
            }
        }
        Ok(parent)
    }

    fn remove(&mut self, id: NodeId) -> Result<Node, DecodeError> {
        self.node(id)?;
        let slot = &mut self.slots[id.index];
        let node = slot.node.take().ok_or(DecodeError::Configuration("node handle is no longer live"))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(node)
    }

    /// Closes `id` and all its ancestors without delivering values.
    pub fn unwind(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            current = self.close(id, false).unwrap_or(None);
        }
    }

    /// Drops every node and the result.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.live = 0;
        self.result = None;
    }
}

fn reject<T>(flags: DecodeFlags, space: &ByteChain, alias: &ByteChain) -> Result<Option<T>, DecodeError> {
    if flags.strict {
        Err(DecodeError::unknown_name(space.as_bytes(), alias.as_bytes()))
    } else {
        tracing::debug!(
            target: "katcodec::node",
            space = %space,
            alias = %alias,
            "skipping unmatched name"
        );
        Ok(None)
    }
}
