//! Lowering of `for [key,] value in container` loops.
//!
//! Chosen once per loop site:
//!
//! - **Static regime**: the container's full shape (element and key
//!   representations) is known at compile time; the loop lowers directly to
//!   the fixed-shape primitives (`has_next`, `value`, `key`, advance).
//! - **Numeric ranges**: `for i in 12` iterates the decimal digits through
//!   a synthetic `(remaining, place, index)` cursor; the loop ends when the
//!   place value reaches zero.
//! - **Dynamic regime**: the shape is statically unknown; a runtime
//!   selector inspects the live object and a jump table dispatches to one of
//!   the nine statically-typed blocks, each ending in a jump to the shared
//!   continuation. A container matching no known shape takes the
//!   distinguished unsupported branch, which raises a typed runtime error.
//!
//! Loop bindings are non-owning references into the container. The
//! container expression is evaluated exactly once and, if it was a
//! temporary, released exactly once at the continuation, whichever path
//! exited the loop.

use sable_core::emit::{Emitter, TypedValue};
use sable_core::runtime::{natives, Shape};
use sable_core::types::{Kind, MachineType, Nature, Type};

use crate::codegen::Codegen;

/// The nine shapes in selector order; also the jump-table layout.
const SHAPES: [Shape; 9] = [
    Shape::PtrArray,
    Shape::IntArray,
    Shape::FloatArray,
    Shape::PtrPtrMap,
    Shape::PtrIntMap,
    Shape::PtrFloatMap,
    Shape::IntPtrMap,
    Shape::IntIntMap,
    Shape::IntFloatMap,
];

/// Names bound by the loop: the value, and optionally the key before it.
#[derive(Debug, Clone)]
pub struct ForeachBindings {
    pub value: String,
    pub key: Option<String>,
}

impl ForeachBindings {
    pub fn value_only(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            key: None,
        }
    }

    pub fn with_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            key: Some(key.into()),
        }
    }
}

enum ElementRepr {
    Int,
    Float,
    Ptr,
}

/// The static shape of a container type, when every element representation
/// is known. Anything dynamic falls back to the runtime selector.
fn shape_of_type(ty: &Type) -> Option<Shape> {
    match ty.kind {
        Kind::Array => Some(match element_repr(&ty.element_type(0))? {
            ElementRepr::Int => Shape::IntArray,
            ElementRepr::Float => Shape::FloatArray,
            ElementRepr::Ptr => Shape::PtrArray,
        }),
        Kind::Map => {
            let key = element_repr(&ty.element_type(0))?;
            let value = element_repr(&ty.element_type(1))?;
            match (key, value) {
                (ElementRepr::Ptr, ElementRepr::Ptr) => Some(Shape::PtrPtrMap),
                (ElementRepr::Ptr, ElementRepr::Int) => Some(Shape::PtrIntMap),
                (ElementRepr::Ptr, ElementRepr::Float) => Some(Shape::PtrFloatMap),
                (ElementRepr::Int, ElementRepr::Ptr) => Some(Shape::IntPtrMap),
                (ElementRepr::Int, ElementRepr::Int) => Some(Shape::IntIntMap),
                (ElementRepr::Int, ElementRepr::Float) => Some(Shape::IntFloatMap),
                (ElementRepr::Float, _) => None,
            }
        }
        _ => None,
    }
}

fn element_repr(ty: &Type) -> Option<ElementRepr> {
    match ty.nature {
        Nature::Pointer => Some(ElementRepr::Ptr),
        Nature::Value => match ty.kind {
            Kind::Integer => Some(ElementRepr::Int),
            Kind::Float => Some(ElementRepr::Float),
            _ => None,
        },
        Nature::Any | Nature::Void => None,
    }
}

fn shape_value_type(shape: Shape) -> Type {
    match shape {
        Shape::IntArray | Shape::PtrIntMap | Shape::IntIntMap => Type::integer(),
        Shape::FloatArray | Shape::PtrFloatMap | Shape::IntFloatMap => Type::float(),
        Shape::PtrArray | Shape::PtrPtrMap | Shape::IntPtrMap => Type::pointer(),
    }
}

fn shape_key_type(shape: Shape) -> Type {
    match shape {
        Shape::PtrArray | Shape::IntArray | Shape::FloatArray => Type::integer(),
        Shape::IntPtrMap | Shape::IntIntMap | Shape::IntFloatMap => Type::integer(),
        Shape::PtrPtrMap | Shape::PtrIntMap | Shape::PtrFloatMap => Type::pointer(),
    }
}

impl<'a> Codegen<'a> {
    /// Lower a foreach loop. `body` is invoked once to emit the loop body,
    /// with the bindings already declared in the loop's scope.
    pub fn compile_foreach(
        &mut self,
        container: TypedValue,
        bindings: &ForeachBindings,
        body: &mut dyn FnMut(&mut Codegen<'a>),
    ) {
        if container.ty.nature == Nature::Value && container.ty.is_numeric() {
            self.compile_foreach_digits(&container, bindings, body);
            return;
        }
        match shape_of_type(&container.ty) {
            Some(shape) => {
                self.compile_foreach_shape(&container, shape, bindings, body);
            }
            None => self.compile_foreach_dynamic(&container, bindings, body),
        }
        // Released exactly once, whichever path left the loop.
        self.insn_release_temporary(&container);
    }

    /// One statically-typed loop over a known shape.
    fn compile_foreach_shape(
        &mut self,
        container: &TypedValue,
        shape: Shape,
        bindings: &ForeachBindings,
        body: &mut dyn FnMut(&mut Codegen<'a>),
    ) {
        let value_ty = shape_value_type(shape);
        let key_ty = shape_key_type(shape);

        let (cond, advance, end, cursor) = {
            let e = self.emitter();
            let cond = e.new_label();
            let advance = e.new_label();
            let end = e.new_label();
            let zero = e.const_i64(0);
            let cursor = e.new_reg(MachineType::I64);
            e.store(cursor, zero);
            (cond, advance, end, cursor)
        };

        self.enter_loop(end, advance);
        self.enter_block();

        let value_slot = self.emitter().new_reg(value_ty.machine_type());
        self.declare_reference(bindings.value.as_str(), value_slot, value_ty.clone());
        let key_slot = bindings.key.as_ref().map(|key| {
            let slot = self.emitter().new_reg(key_ty.machine_type());
            self.declare_reference(key.as_str(), slot, key_ty.clone());
            slot
        });

        {
            let e = self.emitter();
            e.bind(cond);
            let has = e.call_native(
                natives::rt_iter_has_next,
                &[container.reg, cursor],
                MachineType::I32,
            );
            e.branch_if_not(has, end);
        }
        self.add_operations(1);
        {
            let e = self.emitter();
            let value = e.call_native(
                natives::rt_iter_value,
                &[container.reg, cursor],
                value_ty.machine_type(),
            );
            e.store(value_slot, value);
            if let Some(key_slot) = key_slot {
                let key = e.call_native(
                    natives::rt_iter_key,
                    &[container.reg, cursor],
                    key_ty.machine_type(),
                );
                e.store(key_slot, key);
            }
        }

        body(self);

        {
            let e = self.emitter();
            e.bind(advance);
            let one = e.const_i64(1);
            let next = e.add(cursor, one, MachineType::I64);
            e.store(cursor, next);
            e.jump(cond);
            e.bind(end);
        }

        self.leave_block();
        self.leave_loop();
    }

    /// Runtime-dispatched loop: selector, nine-entry jump table, shared
    /// continuation.
    fn compile_foreach_dynamic(
        &mut self,
        container: &TypedValue,
        bindings: &ForeachBindings,
        body: &mut dyn FnMut(&mut Codegen<'a>),
    ) {
        let (done, unsupported, targets) = {
            let e = self.emitter();
            let done = e.new_label();
            let unsupported = e.new_label();
            let targets: Vec<_> = (0..SHAPES.len()).map(|_| e.new_label()).collect();
            let selector = e.call_native(
                natives::rt_shape_selector,
                &[container.reg],
                MachineType::I32,
            );
            e.jump_table(selector, &targets, unsupported);
            (done, unsupported, targets)
        };

        for (shape, label) in SHAPES.into_iter().zip(targets) {
            self.emitter().bind(label);
            self.compile_foreach_shape(container, shape, bindings, body);
            self.emitter().jump(done);
        }

        let e = self.emitter();
        e.bind(unsupported);
        e.call_native(natives::rt_iteration_unsupported, &[], MachineType::Void);
        e.jump(done);
        e.bind(done);
    }

    /// Numeric range: iterate the decimal digits of the value's magnitude.
    fn compile_foreach_digits(
        &mut self,
        container: &TypedValue,
        bindings: &ForeachBindings,
        body: &mut dyn FnMut(&mut Codegen<'a>),
    ) {
        let from = container.ty.machine_type();
        let (cond, advance, end, remaining, place, index) = {
            let e = self.emitter();
            let cond = e.new_label();
            let advance = e.new_label();
            let end = e.new_label();

            let n = e.convert(container.reg, from, MachineType::I64);
            let remaining = e.new_reg(MachineType::I64);
            e.store(remaining, n);
            // Digits of the magnitude: flip the sign of a negative input.
            let zero = e.const_i64(0);
            let negative = e.lt(remaining, zero, MachineType::I64);
            let positive = e.new_label();
            e.branch_if_not(negative, positive);
            let negated = e.neg(remaining, MachineType::I64);
            e.store(remaining, negated);
            e.bind(positive);

            let place_value = e.call_native(
                natives::rt_digits_place,
                &[remaining],
                MachineType::I64,
            );
            let place = e.new_reg(MachineType::I64);
            e.store(place, place_value);
            let zero_again = e.const_i64(0);
            let index = e.new_reg(MachineType::I64);
            e.store(index, zero_again);
            (cond, advance, end, remaining, place, index)
        };

        self.enter_loop(end, advance);
        self.enter_block();

        let value_slot = self.emitter().new_reg(MachineType::I32);
        self.declare_reference(bindings.value.as_str(), value_slot, Type::integer());
        let key_slot = bindings.key.as_ref().map(|key| {
            let slot = self.emitter().new_reg(MachineType::I32);
            self.declare_reference(key.as_str(), slot, Type::integer());
            slot
        });

        {
            let e = self.emitter();
            e.bind(cond);
            // The loop ends once the place value reaches zero.
            let zero = e.const_i64(0);
            let running = e.gt(place, zero, MachineType::I64);
            e.branch_if_not(running, end);
        }
        self.add_operations(1);
        {
            let e = self.emitter();
            let digit = e.int_div(remaining, place, MachineType::I64);
            let digit32 = e.convert(digit, MachineType::I64, MachineType::I32);
            e.store(value_slot, digit32);
            if let Some(key_slot) = key_slot {
                let index32 = e.convert(index, MachineType::I64, MachineType::I32);
                e.store(key_slot, index32);
            }
        }

        body(self);

        {
            let e = self.emitter();
            e.bind(advance);
            let rest = e.rem(remaining, place, MachineType::I64);
            e.store(remaining, rest);
            let ten = e.const_i64(10);
            let next_place = e.int_div(place, ten, MachineType::I64);
            e.store(place, next_place);
            let one = e.const_i64(1);
            let next_index = e.add(index, one, MachineType::I64);
            e.store(index, next_index);
            e.jump(cond);
            e.bind(end);
        }

        self.leave_block();
        self.leave_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Chunk, Instr};
    use crate::chunk_emitter::ChunkEmitter;
    use sable_core::emit::{Emitter, Ownership};
    use sable_core::runtime::Heap;

    fn jump_tables(chunk: &Chunk) -> Vec<usize> {
        chunk
            .code
            .iter()
            .filter_map(|i| match i {
                Instr::JumpTable { targets, .. } => Some(targets.len()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn known_shape_compiles_statically() {
        let mut heap = Heap::new();
        let handle = heap.allocate(sable_core::runtime::ObjData::Array(
            sable_core::runtime::ArrayData::Int(vec![1, 2]),
        ));
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            let container =
                c.new_pointer(handle, Type::int_array(), Ownership::Borrowed);
            c.compile_foreach(
                container,
                &ForeachBindings::value_only("v"),
                &mut |_c| {},
            );
            c.emitter().ret(None);
        }
        let chunk = e.finish();
        assert!(jump_tables(&chunk).is_empty());
    }

    #[test]
    fn unknown_shape_compiles_a_nine_entry_jump_table() {
        let mut heap = Heap::new();
        let handle = heap.allocate(sable_core::runtime::ObjData::Array(
            sable_core::runtime::ArrayData::Int(vec![1, 2]),
        ));
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            let container = c.new_pointer(handle, Type::pointer(), Ownership::Borrowed);
            c.compile_foreach(
                container,
                &ForeachBindings::value_only("v"),
                &mut |_c| {},
            );
            c.emitter().ret(None);
        }
        let chunk = e.finish();
        assert_eq!(jump_tables(&chunk), vec![9]);
    }

    #[test]
    fn numeric_range_uses_no_selector_and_no_table() {
        let mut e = ChunkEmitter::new();
        {
            let mut c = Codegen::new(&mut e);
            let n = c.new_integer(12);
            c.compile_foreach(n, &ForeachBindings::with_key("i", "d"), &mut |_c| {});
            c.emitter().ret(None);
        }
        let chunk = e.finish();
        assert!(jump_tables(&chunk).is_empty());
    }

    #[test]
    fn static_shapes_cover_arrays_and_maps() {
        assert_eq!(shape_of_type(&Type::int_array()), Some(Shape::IntArray));
        assert_eq!(shape_of_type(&Type::float_array()), Some(Shape::FloatArray));
        assert_eq!(
            shape_of_type(&Type::array_of(Type::string())),
            Some(Shape::PtrArray)
        );
        assert_eq!(
            shape_of_type(&Type::map_of(Type::integer(), Type::float())),
            Some(Shape::IntFloatMap)
        );
        assert_eq!(
            shape_of_type(&Type::map_of(Type::string(), Type::integer())),
            Some(Shape::PtrIntMap)
        );
        // Statically unknown elements force the dynamic regime.
        assert_eq!(shape_of_type(&Type::array_of(Type::any())), None);
        assert_eq!(shape_of_type(&Type::pointer()), None);
        assert_eq!(shape_of_type(&Type::set_of(Type::integer())), None);
    }
}
