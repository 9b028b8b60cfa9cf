//! Declared types and the generic-parameter resolution walk.
//!
//! Types are identified by the stable keys adapters are registered under.
//! The hierarchy facts needed to bind type variables (`superclass`,
//! `interfaces`) come from [`TypeInfo`] records registered next to the
//! adapters, never from runtime introspection.

use core::fmt;

use crate::{error::DecodeError, registry::Registry};

/// Upper bound on hierarchy levels visited while binding one variable.
const MAX_DEPTH: usize = 64;

/// A declared type as seen by a builder slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    /// No static type: the adapter is picked from the incoming space name.
    Any,
    Named(String),
    Generic { base: String, args: Vec<TypeRef> },
    /// The `index`-th type parameter declared by `declaring`.
    Var { declaring: String, index: usize },
    /// `? extends upper`.
    Wildcard(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(key: impl Into<String>) -> Self {
        TypeRef::Named(key.into())
    }

    pub fn generic(base: impl Into<String>, args: impl IntoIterator<Item = TypeRef>) -> Self {
        TypeRef::Generic {
            base: base.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn var(declaring: impl Into<String>, index: usize) -> Self {
        TypeRef::Var {
            declaring: declaring.into(),
            index,
        }
    }

    #[must_use]
    pub fn wildcard(upper: TypeRef) -> Self {
        TypeRef::Wildcard(Box::new(upper))
    }

    /// Registry key of a concrete type.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            TypeRef::Named(key) | TypeRef::Generic { base: key, .. } => Some(key),
            _ => None,
        }
    }

    /// Type arguments of a parameterized type, empty otherwise.
    #[must_use]
    pub fn args(&self) -> &[TypeRef] {
        match self {
            TypeRef::Generic { args, .. } => args,
            _ => &[],
        }
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&TypeRef> {
        self.args().get(index)
    }

    /// `true` when the type still needs [`locate`] before an adapter can be
    /// chosen for it.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, TypeRef::Var { .. } | TypeRef::Wildcard(..))
    }

    /// Replaces the variables declared by `owner.key()` with `owner`'s
    /// actual arguments.
    fn substitute(&self, owner: &TypeRef) -> TypeRef {
        match self {
            TypeRef::Var { declaring, index } if Some(declaring.as_str()) == owner.key() => {
                owner.arg(*index).cloned().unwrap_or(TypeRef::Any)
            }
            TypeRef::Generic { base, args } => TypeRef::Generic {
                base: base.clone(),
                args: args.iter().map(|a| a.substitute(owner)).collect(),
            },
            TypeRef::Wildcard(upper) => TypeRef::Wildcard(Box::new(upper.substitute(owner))),
            other => other.clone(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Any => f.write_str("$"),
            TypeRef::Named(key) => f.write_str(key),
            TypeRef::Generic { base, args } => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            TypeRef::Var { declaring, index } => write!(f, "{declaring}#{index}"),
            TypeRef::Wildcard(upper) => write!(f, "? extends {upper}"),
        }
    }
}

/// Hierarchy record of a registered type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeInfo {
    pub key: String,
    pub is_interface: bool,
    /// Direct superclass as written in the declaration, possibly mentioning
    /// this type's own variables.
    pub superclass: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
}

impl TypeInfo {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn extends(mut self, superclass: TypeRef) -> Self {
        self.superclass = Some(superclass);
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    #[must_use]
    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }
}

/// Resolves `unknown` against the concrete type `scope`.
///
/// Wildcards resolve to their upper bound. A type variable is bound by
/// walking `scope`'s hierarchy, interfaces before the superclass, until the
/// variable's declaring type is reached; the argument found there is
/// resolved again in turn. Concrete types are returned unchanged.
///
/// # Errors
///
/// [`DecodeError::UnresolvedType`] when the hierarchy is exhausted without
/// reaching the declaring type.
pub fn locate(unknown: &TypeRef, scope: &TypeRef, registry: &dyn Registry) -> Result<TypeRef, DecodeError> {
    locate_at(unknown, scope, registry, 0)
}

fn locate_at(unknown: &TypeRef, scope: &TypeRef, registry: &dyn Registry, depth: usize) -> Result<TypeRef, DecodeError> {
    match unknown {
        TypeRef::Wildcard(upper) => locate_at(upper, scope, registry, depth + 1),
        TypeRef::Var { declaring, index } => {
            let Some(bound) = bind(declaring, *index, scope, registry, depth)? else {
                return Err(unresolved(unknown, scope));
            };
            if bound.is_unresolved() {
                if depth >= MAX_DEPTH || bound == *unknown {
                    return Err(unresolved(unknown, scope));
                }
                locate_at(&bound, scope, registry, depth + 1)
            } else {
                Ok(bound)
            }
        }
        concrete => Ok(concrete.clone()),
    }
}

/// Finds the argument bound to `declaring#index` somewhere above `current`.
fn bind(
    declaring: &str,
    index: usize,
    current: &TypeRef,
    registry: &dyn Registry,
    depth: usize,
) -> Result<Option<TypeRef>, DecodeError> {
    if depth > MAX_DEPTH {
        return Ok(None);
    }
    let Some(key) = current.key() else {
        return Ok(None);
    };
    if key == declaring {
        // A raw use of the declaring type erases its parameters.
        return Ok(Some(current.arg(index).cloned().unwrap_or(TypeRef::Any)));
    }

    let Some(info) = registry.type_info(key) else {
        return Ok(None);
    };
    for parent in info.interfaces.iter().chain(info.superclass.iter()) {
        let parent = parent.substitute(current);
        if let Some(found) = bind(declaring, index, &parent, registry, depth + 1)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn unresolved(variable: &TypeRef, scope: &TypeRef) -> DecodeError {
    DecodeError::UnresolvedType {
        variable: variable.to_string(),
        scope: scope.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    fn hierarchy() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        // interface Holder<V>; class Box<T> implements Holder<T>;
        // class IntBox extends Box<i>; class Pair<A, B> extends Box<B>
        registry.register_type(TypeInfo::new("Holder").interface());
        registry.register_type(TypeInfo::new("Box").implements(TypeRef::generic("Holder", [TypeRef::var("Box", 0)])));
        registry.register_type(TypeInfo::new("IntBox").extends(TypeRef::generic("Box", [TypeRef::named("i")])));
        registry.register_type(TypeInfo::new("Pair").extends(TypeRef::generic("Box", [TypeRef::var("Pair", 1)])));
        registry
    }

    #[test]
    fn concrete_and_wildcard() {
        let registry = hierarchy();
        let scope = TypeRef::named("IntBox");
        assert_eq!(locate(&TypeRef::named("s"), &scope, &registry).unwrap(), TypeRef::named("s"));
        assert_eq!(
            locate(&TypeRef::wildcard(TypeRef::named("d")), &scope, &registry).unwrap(),
            TypeRef::named("d")
        );
    }

    #[test]
    fn variable_bound_on_superclass() {
        let registry = hierarchy();
        let found = locate(&TypeRef::var("Box", 0), &TypeRef::named("IntBox"), &registry).unwrap();
        assert_eq!(found, TypeRef::named("i"));
    }

    #[test]
    fn variable_bound_through_interface_chain() {
        let registry = hierarchy();
        let scope = TypeRef::generic("Pair", [TypeRef::named("s"), TypeRef::named("b")]);
        assert_eq!(
            locate(&TypeRef::var("Holder", 0), &scope, &registry).unwrap(),
            TypeRef::named("b")
        );
    }

    #[test]
    fn variable_bound_directly() {
        let registry = hierarchy();
        let scope = TypeRef::generic("Box", [TypeRef::wildcard(TypeRef::named("l"))]);
        assert_eq!(locate(&TypeRef::var("Box", 0), &scope, &registry).unwrap(), TypeRef::named("l"));
    }

    #[test]
    fn exhausted_hierarchy_is_unresolved() {
        let registry = hierarchy();
        let err = locate(&TypeRef::var("Map", 1), &TypeRef::named("IntBox"), &registry).unwrap_err();
        assert!(matches!(err, DecodeError::UnresolvedType { ref variable, .. } if variable == "Map#1"));
    }

    #[test]
    fn display_renders_arguments() {
        let t = TypeRef::generic("Pair", [TypeRef::named("s"), TypeRef::wildcard(TypeRef::Any)]);
        assert_eq!(t.to_string(), "Pair<s, ? extends $>");
    }
}
