//! The instruction-construction boundary.
//!
//! The code generator never talks to a concrete backend: it emits through
//! [`Emitter`], a small set of primitive instruction-construction operations
//! parameterized by [`MachineType`](crate::types::MachineType), the minimal
//! target-independent descriptor derived from a type's nature and raw kind.
//!
//! Compiled values are [`TypedValue`]s: a virtual register plus the full
//! structural type plus an [`Ownership`] tag. The tag is what makes the
//! memory discipline locally checkable: every value is either a fresh
//! `Temporary` nobody owns yet, an `Owned` reference a variable or slot is
//! responsible for, or a `Borrowed` view someone else will release.

use crate::runtime::{Handle, NativeFn};
use crate::types::{MachineType, Type};

/// A virtual register produced by the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u32);

/// A branch target, bound to a position by [`Emitter::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// Who is responsible for releasing a compiled pointer-natured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Freshly produced, not yet owned by any variable, field, or slot.
    Temporary,
    /// Owned by a variable or container slot; released at scope exit or
    /// reassignment.
    Owned,
    /// A non-owning view (loop bindings, reads through a variable).
    Borrowed,
}

/// A compiled value: register, structural type, ownership tag.
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub reg: Reg,
    pub ty: Type,
    pub ownership: Ownership,
}

impl TypedValue {
    pub fn temporary(reg: Reg, ty: Type) -> Self {
        Self {
            reg,
            ty,
            ownership: Ownership::Temporary,
        }
    }

    pub fn owned(reg: Reg, ty: Type) -> Self {
        Self {
            reg,
            ty,
            ownership: Ownership::Owned,
        }
    }

    pub fn borrowed(reg: Reg, ty: Type) -> Self {
        Self {
            reg,
            ty,
            ownership: Ownership::Borrowed,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.ownership == Ownership::Temporary
    }

    /// This value holds a heap reference the discipline must balance.
    pub fn is_managed(&self) -> bool {
        self.ty.must_manage_memory()
    }
}

/// Primitive instruction-construction operations.
///
/// Implemented by the in-repo instruction-list backend; a native-code
/// backend would implement the same surface. All operations are typed by
/// `MachineType` only; the emitter never sees the structural type model.
pub trait Emitter {
    // Constants
    fn const_i32(&mut self, value: i32) -> Reg;
    fn const_i64(&mut self, value: i64) -> Reg;
    fn const_f64(&mut self, value: f64) -> Reg;
    fn const_ptr(&mut self, value: Handle) -> Reg;

    /// Allocate a mutable virtual register.
    fn new_reg(&mut self, ty: MachineType) -> Reg;
    /// Store `src` into the mutable register `dst`.
    fn store(&mut self, dst: Reg, src: Reg);
    /// Convert between machine representations.
    fn convert(&mut self, src: Reg, from: MachineType, to: MachineType) -> Reg;

    // Arithmetic
    fn add(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn sub(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn mul(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    /// Floating-point division.
    fn div(&mut self, a: Reg, b: Reg) -> Reg;
    /// Integer division; raises division-by-zero at runtime.
    fn int_div(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn rem(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn neg(&mut self, a: Reg, ty: MachineType) -> Reg;

    // Comparison: the result is an I32 (0 or 1).
    fn eq(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn ne(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn lt(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn le(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn gt(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn ge(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg;
    fn not(&mut self, a: Reg) -> Reg;

    // Control flow
    fn new_label(&mut self) -> Label;
    fn bind(&mut self, label: Label);
    fn jump(&mut self, label: Label);
    fn branch_if(&mut self, cond: Reg, label: Label);
    fn branch_if_not(&mut self, cond: Reg, label: Label);
    /// Dispatch on an I32 index: in-range indices jump to the matching
    /// target, everything else to `default`.
    fn jump_table(&mut self, index: Reg, targets: &[Label], default: Label);

    /// Call a native helper. `ret` describes the machine representation of
    /// the returned value (`Void` for none).
    fn call_native(&mut self, func: NativeFn, args: &[Reg], ret: MachineType) -> Reg;

    /// Attach a source line to subsequently emitted instructions.
    fn set_line(&mut self, line: u32);

    /// Finish execution, optionally producing a value.
    fn ret(&mut self, value: Option<Reg>);
}
