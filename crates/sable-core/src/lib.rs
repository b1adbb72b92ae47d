//! Core types for the sable compiler and runtime.
//!
//! This crate is the leaf of the workspace: it defines the structural type
//! model, the unified error hierarchy, the target-independent emitter
//! interface, and the reference-counted runtime value model. It has no
//! knowledge of the analyzer, the resolver, or the code generator.

pub mod emit;
pub mod error;
pub mod runtime;
pub mod span;
pub mod types;

pub use emit::{Emitter, Label, Ownership, Reg, TypedValue};
pub use error::{
    RegistrationError, RuntimeError, RuntimeException, SemanticError, StackFrame,
};
pub use runtime::{
    ArrayData, Handle, Heap, MapData, NativeFn, ObjData, ObjectData, RuntimeCtx, SetData, Shape,
    Slot, DEFAULT_OPERATION_LIMIT, SHAPE_COUNT,
};
pub use span::Span;
pub use types::{Kind, MachineType, Nature, Type};
