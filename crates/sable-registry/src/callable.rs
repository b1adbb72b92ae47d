//! Callables and their type-specialized versions.
//!
//! A [`Callable`] is a named group of [`CallableVersion`]s. Each version is
//! one concrete implementation: declared argument types, a return type,
//! flags, post-resolution [`Mutator`]s, and the implementation itself:
//! either an executable native address or an inline code-generation closure
//! over the emitter boundary.
//!
//! Versions are scored by the resolver in declaration order; that order is
//! behaviorally visible (score ties go to the version declared last), so
//! registration order matters and is preserved.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use sable_core::emit::{Emitter, TypedValue};
use sable_core::runtime::NativeFn;
use sable_core::types::Type;

bitflags! {
    /// Flags on a callable version.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VersionFlags: u8 {
        /// A fallback implementation skipped during normal resolution.
        const DEFAULT = 1 << 0;
        /// Provided only for legacy programs.
        const LEGACY = 1 << 1;
    }
}

/// Inline code-generation closure: given the emitter and the compiled
/// arguments (already converted to the declared parameter types), emit the
/// operation and describe its result.
pub type EmitFn = Arc<dyn Fn(&mut dyn Emitter, &[TypedValue]) -> TypedValue + Send + Sync>;

/// How a version is implemented.
#[derive(Clone)]
pub enum NativeImpl {
    /// An executable native helper, called at runtime.
    Runtime(NativeFn),
    /// Inline code generation at the call site.
    Emit(EmitFn),
}

impl fmt::Debug for NativeImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeImpl::Runtime(_) => f.write_str("Runtime(..)"),
            NativeImpl::Emit(_) => f.write_str("Emit(..)"),
        }
    }
}

/// A post-resolution hook adjusting how an argument is analyzed once a
/// version has been chosen. The set is closed; the analyzer interprets it.
///
/// Argument indices count the receiver first when the call has one.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutator {
    /// The container argument will store the value argument: widen the
    /// container variable's declared element type accordingly.
    WillStoreElement { container: usize, value: usize },
    /// The container argument will store elements of a fixed type.
    WillTakeElement { container: usize, ty: Type },
}

/// One concrete, type-specialized implementation of a callable.
#[derive(Debug, Clone)]
pub struct CallableVersion {
    pub argument_types: Vec<Type>,
    pub return_type: Type,
    pub flags: VersionFlags,
    pub mutators: Vec<Mutator>,
    pub imp: NativeImpl,
}

impl CallableVersion {
    /// A version implemented by a native helper called at runtime.
    pub fn runtime(argument_types: Vec<Type>, return_type: Type, f: NativeFn) -> Self {
        Self {
            argument_types,
            return_type,
            flags: VersionFlags::empty(),
            mutators: Vec::new(),
            imp: NativeImpl::Runtime(f),
        }
    }

    /// A version implemented by inline code generation.
    pub fn emit(
        argument_types: Vec<Type>,
        return_type: Type,
        f: impl Fn(&mut dyn Emitter, &[TypedValue]) -> TypedValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            argument_types,
            return_type,
            flags: VersionFlags::empty(),
            mutators: Vec::new(),
            imp: NativeImpl::Emit(Arc::new(f)),
        }
    }

    pub fn with_flags(mut self, flags: VersionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_mutator(mut self, mutator: Mutator) -> Self {
        self.mutators.push(mutator);
        self
    }

    pub fn arity(&self) -> usize {
        self.argument_types.len()
    }
}

/// A named group of versions.
#[derive(Debug, Clone, Default)]
pub struct Callable {
    pub name: String,
    pub versions: Vec<CallableVersion>,
}

impl Callable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
        }
    }

    /// Append a version. Declaration order is preserved and significant.
    pub fn add_version(&mut self, version: CallableVersion) -> &mut Self {
        self.versions.push(version);
        self
    }

    /// Whether any version takes this many arguments.
    pub fn is_compatible(&self, argument_count: usize) -> bool {
        self.versions.iter().any(|v| v.arity() == argument_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::runtime::natives::rt_add_any;

    #[test]
    fn versions_keep_declaration_order() {
        let mut callable = Callable::new("+");
        callable.add_version(CallableVersion::runtime(
            vec![Type::any(), Type::any()],
            Type::any(),
            rt_add_any,
        ));
        callable.add_version(
            CallableVersion::runtime(vec![Type::any(), Type::any()], Type::any(), rt_add_any)
                .with_flags(VersionFlags::LEGACY),
        );
        assert_eq!(callable.versions.len(), 2);
        assert!(callable.versions[1].flags.contains(VersionFlags::LEGACY));
        assert!(callable.is_compatible(2));
        assert!(!callable.is_compatible(1));
    }
}
