//! The symbol environment.
//!
//! This crate holds everything the resolver and the analyzer consult about
//! the outside world: callables (operators, free functions, methods) with
//! their type-specialized versions, and classes with fields and static
//! fields. The environment is built once, before any program is analyzed,
//! and is passed by reference everywhere; there is no ambient global state.

mod builtins;
mod callable;
mod environment;

pub use builtins::register_builtins;
pub use callable::{Callable, CallableVersion, EmitFn, Mutator, NativeImpl, VersionFlags};
pub use environment::{
    ClassDef, Environment, FieldDef, FieldInit, StaticFieldDef, SymbolId,
};
