//! Code generation and the memory/ownership discipline.
//!
//! [`Codegen`] wraps the emitter boundary and carries the contract the
//! instruction layer knows nothing about: which compiled values own heap
//! references, and where acquire/release/clone/move must be placed.
//!
//! The rules, applied per expression node:
//! - storing a pointer-natured value into a variable or slot acquires it,
//!   except when the value is a Temporary; then ownership transfers without
//!   touching the count;
//! - reassignment releases the previously owned value before the new one is
//!   stored;
//! - block exit releases every non-reference managed local of that block,
//!   and `break`/`continue`/`return` release all scopes being exited,
//!   innermost first, before transferring control;
//! - a consumed temporary is released right after the operation that does
//!   not retain it (a runtime no-op if something took ownership meanwhile);
//! - `clone` deep-copies pointer-natured values and is the identity on
//!   unboxed ones; `move` hands a temporary to its sole consumer and clones
//!   anything owned or borrowed.
//!
//! There is no runtime error path here: a misplaced pair is a latent leak or
//! premature free, prevented by construction and checked by the counter
//! tests.

use sable_core::emit::{Emitter, Label, Ownership, Reg, TypedValue};
use sable_core::runtime::{natives, Handle, NativeFn};
use sable_core::types::{Kind, MachineType, Nature, Type};
use sable_registry::{CallableVersion, NativeImpl};

/// A compile-time variable slot.
#[derive(Debug, Clone)]
pub struct CompilerVar {
    pub value: TypedValue,
    /// Reference bindings are not owned here and are never released at
    /// block exit (loop bindings, parameters passed by reference).
    pub reference: bool,
}

struct LoopFrame {
    end: Label,
    cond: Label,
    /// Blocks entered since this loop started, for break/continue unwinding.
    blocks: u32,
}

/// The code generator: emitter access plus the lexical block stack.
pub struct Codegen<'a> {
    emit: &'a mut dyn Emitter,
    blocks: Vec<Vec<(String, CompilerVar)>>,
    loops: Vec<LoopFrame>,
}

impl<'a> Codegen<'a> {
    pub fn new(emit: &'a mut dyn Emitter) -> Self {
        Self {
            emit,
            blocks: vec![Vec::new()],
            loops: Vec::new(),
        }
    }

    /// Direct access to the emitter for expression-level instructions.
    pub fn emitter(&mut self) -> &mut dyn Emitter {
        &mut *self.emit
    }

    // ==========================================================================
    // Constants
    // ==========================================================================

    pub fn new_integer(&mut self, value: i32) -> TypedValue {
        TypedValue::temporary(self.emit.const_i32(value), Type::integer())
    }

    pub fn new_long(&mut self, value: i64) -> TypedValue {
        TypedValue::temporary(self.emit.const_i64(value), Type::long())
    }

    pub fn new_float(&mut self, value: f64) -> TypedValue {
        TypedValue::temporary(self.emit.const_f64(value), Type::float())
    }

    pub fn new_boolean(&mut self, value: bool) -> TypedValue {
        TypedValue::temporary(self.emit.const_i32(value as i32), Type::boolean())
    }

    /// Reference a pre-existing heap object (a literal pool entry, a global).
    pub fn new_pointer(&mut self, handle: Handle, ty: Type, ownership: Ownership) -> TypedValue {
        TypedValue {
            reg: self.emit.const_ptr(handle),
            ty,
            ownership,
        }
    }

    // ==========================================================================
    // Blocks and loops
    // ==========================================================================

    pub fn enter_block(&mut self) {
        self.blocks.push(Vec::new());
        if let Some(frame) = self.loops.last_mut() {
            frame.blocks += 1;
        }
    }

    pub fn leave_block(&mut self) {
        let index = self.blocks.len() - 1;
        self.release_block(index);
        self.blocks.pop();
        if let Some(frame) = self.loops.last_mut()
            && frame.blocks > 0
        {
            frame.blocks -= 1;
        }
    }

    pub fn enter_loop(&mut self, end: Label, cond: Label) {
        self.loops.push(LoopFrame {
            end,
            cond,
            blocks: 0,
        });
    }

    pub fn leave_loop(&mut self) {
        self.loops.pop();
    }

    /// Emit releases for the managed locals of one block, without popping it.
    fn release_block(&mut self, index: usize) {
        let regs: Vec<Reg> = self.blocks[index]
            .iter()
            .filter(|(_, var)| !var.reference && var.value.is_managed())
            .map(|(_, var)| var.value.reg)
            .collect();
        for reg in regs {
            self.emit
                .call_native(natives::rt_release, &[reg], MachineType::Void);
        }
    }

    /// Release the innermost `count` blocks, innermost first. Used when
    /// control leaves several scopes at once.
    fn release_innermost_blocks(&mut self, count: usize) {
        let len = self.blocks.len();
        for index in (len - count..len).rev() {
            self.release_block(index);
        }
    }

    /// `break` out of `depth` nested loops: release every block entered
    /// since the target loop started, then jump to its end.
    pub fn compile_break(&mut self, depth: usize) {
        assert!(
            depth >= 1 && depth <= self.loops.len(),
            "break outside of a loop"
        );
        let start = self.loops.len() - depth;
        let blocks: u32 = self.loops[start..].iter().map(|f| f.blocks).sum();
        self.release_innermost_blocks(blocks as usize);
        let target = self.loops[start].end;
        self.emit.jump(target);
    }

    /// `continue` the loop `depth` levels out.
    pub fn compile_continue(&mut self, depth: usize) {
        assert!(
            depth >= 1 && depth <= self.loops.len(),
            "continue outside of a loop"
        );
        let start = self.loops.len() - depth;
        let blocks: u32 = self.loops[start..].iter().map(|f| f.blocks).sum();
        self.release_innermost_blocks(blocks as usize);
        let target = self.loops[start].cond;
        self.emit.jump(target);
    }

    /// Return from the function: move the result out, release every open
    /// scope innermost first, then emit the return.
    pub fn compile_return(&mut self, value: Option<TypedValue>) {
        let result = value.map(|v| self.insn_move(v));
        self.release_innermost_blocks(self.blocks.len());
        self.emit.ret(result.map(|r| r.reg));
    }

    // ==========================================================================
    // Variables
    // ==========================================================================

    fn top_block(&mut self) -> &mut Vec<(String, CompilerVar)> {
        match self.blocks.last_mut() {
            Some(block) => block,
            None => panic!("no open block"),
        }
    }

    /// Declare a variable in the innermost block, taking ownership of the
    /// value per the store contract.
    pub fn declare_var(
        &mut self,
        name: impl Into<String>,
        value: TypedValue,
        reference: bool,
    ) -> TypedValue {
        let name = name.into();
        let slot = self.emit.new_reg(value.ty.machine_type());
        self.emit.store(slot, value.reg);
        let stored = if reference {
            TypedValue::borrowed(slot, value.ty.clone())
        } else {
            let owned = self.insn_acquire(&value);
            TypedValue::owned(slot, owned.ty)
        };
        self.top_block().push((
            name,
            CompilerVar {
                value: stored.clone(),
                reference,
            },
        ));
        stored
    }

    /// Bind a name to an existing register as a non-owning reference, with
    /// no store and no ownership traffic. Used for loop bindings.
    pub fn declare_reference(&mut self, name: impl Into<String>, reg: Reg, ty: Type) {
        let name = name.into();
        self.top_block().push((
            name,
            CompilerVar {
                value: TypedValue::borrowed(reg, ty),
                reference: true,
            },
        ));
    }

    fn find_var(&self, name: &str) -> Option<(usize, usize)> {
        for (block_index, block) in self.blocks.iter().enumerate().rev() {
            if let Some(var_index) = block.iter().rposition(|(n, _)| n == name) {
                return Some((block_index, var_index));
            }
        }
        None
    }

    /// A non-owning view of a variable's current value.
    pub fn load_var(&self, name: &str) -> Option<TypedValue> {
        let (block, var) = self.find_var(name)?;
        let var = &self.blocks[block][var].1;
        Some(TypedValue::borrowed(var.value.reg, var.value.ty.clone()))
    }

    /// Reassign a variable: acquire the new value, release the one the
    /// variable owned, store.
    pub fn store_var(&mut self, name: &str, value: TypedValue) {
        let Some((block, var)) = self.find_var(name) else {
            panic!("store to undeclared variable '{name}'");
        };
        let (slot, managed, reference) = {
            let var = &self.blocks[block][var].1;
            (var.value.reg, var.value.is_managed(), var.reference)
        };
        let value = self.insn_acquire(&value);
        if managed && !reference {
            self.emit
                .call_native(natives::rt_release, &[slot], MachineType::Void);
        }
        self.emit.store(slot, value.reg);
    }

    // ==========================================================================
    // Memory primitives
    // ==========================================================================

    /// Take ownership of a value that is being stored or captured.
    /// Temporaries transfer without a count increment.
    pub fn insn_acquire(&mut self, value: &TypedValue) -> TypedValue {
        if !value.is_managed() {
            return value.clone();
        }
        if value.is_temporary() {
            return TypedValue::owned(value.reg, value.ty.clone());
        }
        self.emit
            .call_native(natives::rt_acquire, &[value.reg], MachineType::Void);
        TypedValue::owned(value.reg, value.ty.clone())
    }

    /// Drop an owned reference.
    pub fn insn_release(&mut self, value: &TypedValue) {
        if value.is_managed() {
            self.emit
                .call_native(natives::rt_release, &[value.reg], MachineType::Void);
        }
    }

    /// Consume a temporary nothing retained. Runtime no-op if ownership was
    /// taken in the meantime.
    pub fn insn_release_temporary(&mut self, value: &TypedValue) {
        if value.is_managed() && value.is_temporary() {
            self.emit.call_native(
                natives::rt_release_temporary,
                &[value.reg],
                MachineType::Void,
            );
        }
    }

    /// Materialize an independent copy: deep for pointer-natured values,
    /// the identity for unboxed ones.
    pub fn insn_clone(&mut self, value: &TypedValue) -> TypedValue {
        if matches!(value.ty.nature, Nature::Pointer | Nature::Any) {
            let reg = self
                .emit
                .call_native(natives::rt_clone, &[value.reg], MachineType::Ptr);
            TypedValue::temporary(reg, value.ty.clone())
        } else {
            value.clone()
        }
    }

    /// Hand a value to a consumer that will own it. A temporary passes
    /// through; anything owned or borrowed is cloned so the handover cannot
    /// alias a slot that is about to be released.
    pub fn insn_move(&mut self, value: TypedValue) -> TypedValue {
        if !value.is_managed() || value.is_temporary() {
            return value;
        }
        self.insn_clone(&value)
    }

    /// Discard a statement value that nothing consumed.
    pub fn discard(&mut self, value: TypedValue) {
        self.insn_release_temporary(&value);
    }

    // ==========================================================================
    // Operation budget
    // ==========================================================================

    /// Charge `count` operations against the program's budget.
    pub fn add_operations(&mut self, count: i64) {
        let cost = self.emit.const_i64(count);
        self.emit
            .call_native(natives::rt_check_operations, &[cost], MachineType::Void);
    }

    // ==========================================================================
    // Calls
    // ==========================================================================

    /// Convert a compiled value to a parameter's representation: numeric
    /// widening stays inline, boxing goes through the runtime.
    pub fn convert_to(&mut self, value: TypedValue, target: &Type) -> TypedValue {
        let from = value.ty.machine_type();
        let to = target.machine_type();
        if from == to {
            return value;
        }
        if to == MachineType::Ptr {
            let boxer = match value.ty.kind {
                Kind::Boolean => natives::rt_box_bool,
                Kind::Float => natives::rt_box_float,
                _ => natives::rt_box_int,
            };
            let reg = self
                .emit
                .call_native(boxer, &[value.reg], MachineType::Ptr);
            return TypedValue::temporary(reg, value.ty.clone().boxed());
        }
        if from == MachineType::Ptr || from == MachineType::Void || to == MachineType::Void {
            panic!("unsupported conversion {from:?} -> {to:?}");
        }
        let reg = self.emit.convert(value.reg, from, to);
        TypedValue {
            reg,
            ty: target.clone(),
            ownership: value.ownership,
        }
    }

    /// Compile a call to a resolved version: convert the arguments to the
    /// declared parameter types, dispatch inline or through the runtime, and
    /// consume the argument temporaries the callee did not retain.
    pub fn compile_call(
        &mut self,
        version: &CallableVersion,
        arguments: Vec<TypedValue>,
    ) -> TypedValue {
        self.add_operations(1);
        let mut converted = Vec::with_capacity(arguments.len());
        let mut temporaries: Vec<TypedValue> = Vec::new();
        for (argument, param) in arguments.into_iter().zip(&version.argument_types) {
            if argument.is_temporary() && argument.is_managed() {
                temporaries.push(argument.clone());
            }
            let value = self.convert_to(argument, param);
            if value.is_temporary()
                && value.is_managed()
                && !temporaries.iter().any(|t| t.reg == value.reg)
            {
                temporaries.push(value.clone());
            }
            converted.push(value);
        }
        let result = match &version.imp {
            NativeImpl::Emit(f) => f.as_ref()(&mut *self.emit, &converted),
            NativeImpl::Runtime(f) => {
                let regs: Vec<Reg> = converted.iter().map(|v| v.reg).collect();
                let ret = version.return_type.machine_type();
                let reg = self.emit.call_native(*f, &regs, ret);
                TypedValue::temporary(reg, version.return_type.clone())
            }
        };
        for temporary in temporaries {
            self.insn_release_temporary(&temporary);
        }
        result
    }

    // ==========================================================================
    // Literals
    // ==========================================================================

    /// Build an array literal. Elements convert to the merged element type;
    /// stored pointers transfer or share ownership through the push helper.
    pub fn compile_array_literal(
        &mut self,
        elements: Vec<TypedValue>,
        element_type: &Type,
    ) -> TypedValue {
        self.add_operations(1 + elements.len() as i64);
        let (constructor, push): (NativeFn, NativeFn) = match element_type.machine_type() {
            MachineType::F64 => (natives::rt_array_new_float, natives::rt_array_push_float),
            MachineType::Ptr => (natives::rt_array_new_ptr, natives::rt_array_push_ptr),
            _ => (natives::rt_array_new_int, natives::rt_array_push_int),
        };
        let array = self.emit.call_native(constructor, &[], MachineType::Ptr);
        for element in elements {
            let value = self.convert_to(element, element_type);
            self.emit
                .call_native(push, &[array, value.reg], MachineType::Void);
            self.insn_release_temporary(&value);
        }
        TypedValue::temporary(array, Type::array_of(element_type.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instr;
    use crate::chunk_emitter::ChunkEmitter;

    fn native_calls(chunk: &crate::bytecode::Chunk) -> usize {
        chunk
            .code
            .iter()
            .filter(|i| matches!(i, Instr::CallNative { .. }))
            .count()
    }

    #[test]
    fn unboxed_locals_are_not_released() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            c.enter_block();
            let v = c.new_integer(1);
            c.declare_var("x", v, false);
            c.leave_block();
        }
        assert_eq!(native_calls(&e.finish()), 0);
    }

    #[test]
    fn owned_pointer_locals_release_at_block_exit() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            c.enter_block();
            let v = TypedValue::borrowed(c.emitter().new_reg(MachineType::Ptr), Type::string());
            c.declare_var("s", v, false);
            c.leave_block();
        }
        // One acquire at the store, one release at block exit.
        assert_eq!(native_calls(&e.finish()), 2);
    }

    #[test]
    fn temporaries_transfer_without_acquire() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            c.enter_block();
            let v = TypedValue::temporary(c.emitter().new_reg(MachineType::Ptr), Type::string());
            c.declare_var("s", v, false);
            c.leave_block();
        }
        // Ownership transferred: only the block-exit release remains.
        assert_eq!(native_calls(&e.finish()), 1);
    }

    #[test]
    fn reference_bindings_are_never_released() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            c.enter_block();
            let v = TypedValue::borrowed(c.emitter().new_reg(MachineType::Ptr), Type::string());
            c.declare_var("s", v, true);
            c.leave_block();
        }
        assert_eq!(native_calls(&e.finish()), 0);
    }

    #[test]
    fn reassignment_releases_the_previous_value() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            let first =
                TypedValue::temporary(c.emitter().new_reg(MachineType::Ptr), Type::string());
            c.declare_var("s", first, false);
            let second =
                TypedValue::temporary(c.emitter().new_reg(MachineType::Ptr), Type::string());
            c.store_var("s", second);
        }
        // Declaration transfers; reassignment releases the old value only
        // (the new temporary transfers too).
        assert_eq!(native_calls(&e.finish()), 1);
    }

    #[test]
    fn insn_move_clones_owned_values_only() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            let temp =
                TypedValue::temporary(c.emitter().new_reg(MachineType::Ptr), Type::string());
            let reg = temp.reg;
            let moved = c.insn_move(temp);
            assert_eq!(moved.reg, reg);

            let owned = TypedValue::owned(c.emitter().new_reg(MachineType::Ptr), Type::string());
            let moved = c.insn_move(owned.clone());
            assert_ne!(moved.reg, owned.reg);
        }
        assert_eq!(native_calls(&e.finish()), 1);
    }

    #[test]
    fn move_of_unboxed_values_is_identity() {
        let mut e = ChunkEmitter::new();
        let mut c = Codegen::new(&mut e);
        let v = c.new_integer(3);
        let reg = v.reg;
        let moved = c.insn_move(v);
        assert_eq!(moved.reg, reg);
    }

    #[test]
    #[should_panic]
    fn break_outside_a_loop_fails_fast() {
        let mut e = ChunkEmitter::new();
        let mut c = Codegen::new(&mut e);
        c.compile_break(1);
    }
}
