//! Native helpers callable from generated code.
//!
//! Generated code reaches the runtime exclusively through `call_native`
//! instructions targeting these functions. They cover the four memory
//! primitives, the operation budget, the dynamic-iteration selector and the
//! per-shape iteration accessors, container construction for literals,
//! boxing, the dynamic arithmetic fallbacks, and printing.
//!
//! Argument slots are produced by typed emitted code; a representation
//! mismatch here is a code-generation bug and fails fast.

use crate::error::RuntimeError;

use super::heap::{ArrayData, Handle, MapData, ObjData, SHAPE_COUNT};
use super::value_ops;
use super::{RuntimeCtx, Slot};

fn ptr_arg(args: &[Slot], i: usize) -> Handle {
    match args[i] {
        Slot::Ptr(h) => h,
        ref other => panic!("native helper expected a pointer argument, got {other:?}"),
    }
}

fn int_arg(args: &[Slot], i: usize) -> i64 {
    match args[i] {
        Slot::Int(v) => v,
        ref other => panic!("native helper expected an integer argument, got {other:?}"),
    }
}

fn float_arg(args: &[Slot], i: usize) -> f64 {
    match args[i] {
        Slot::Float(v) => v,
        Slot::Int(v) => v as f64,
        ref other => panic!("native helper expected a float argument, got {other:?}"),
    }
}

// ============================================================================
// Memory primitives
// ============================================================================

pub fn rt_acquire(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    ctx.heap.acquire(ptr_arg(args, 0));
    Ok(Slot::Void)
}

pub fn rt_release(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    ctx.heap.release(ptr_arg(args, 0));
    Ok(Slot::Void)
}

pub fn rt_release_temporary(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    ctx.heap.release_temporary(ptr_arg(args, 0));
    Ok(Slot::Void)
}

pub fn rt_clone(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    Ok(Slot::Ptr(ctx.heap.clone_value(ptr_arg(args, 0))))
}

// ============================================================================
// Operation budget
// ============================================================================

pub fn rt_check_operations(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    ctx.operations += int_arg(args, 0) as u64;
    if ctx.operation_limit > 0 && ctx.operations > ctx.operation_limit {
        return Err(RuntimeError::OperationLimitExceeded);
    }
    Ok(Slot::Void)
}

// ============================================================================
// Iteration
// ============================================================================

/// Map a live container to its jump-table index; anything outside the known
/// shape set lands on `SHAPE_COUNT`, the table's unsupported branch.
pub fn rt_shape_selector(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let index = match ctx.heap.shape_of(handle) {
        Some(shape) => u8::from(shape) as i64,
        None => SHAPE_COUNT as i64,
    };
    Ok(Slot::Int(index))
}

/// The unsupported branch of the dynamic regime: a typed error, never a
/// silent fall-through.
pub fn rt_iteration_unsupported(
    _ctx: &mut RuntimeCtx,
    _args: &[Slot],
) -> Result<Slot, RuntimeError> {
    Err(RuntimeError::NoSuchOperator)
}

pub fn rt_iter_has_next(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let cursor = int_arg(args, 1) as usize;
    let len = match ctx.heap.data(handle) {
        ObjData::Array(ArrayData::Int(v)) => v.len(),
        ObjData::Array(ArrayData::Float(v)) => v.len(),
        ObjData::Array(ArrayData::Ptr(v)) => v.len(),
        ObjData::Map(map) => value_ops::map_len(map),
        _ => return Err(RuntimeError::NoSuchOperator),
    };
    Ok(Slot::Int((cursor < len) as i64))
}

/// The element under the cursor. The slot representation follows the
/// container's actual shape, which the emitted code knows statically.
pub fn rt_iter_value(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let cursor = int_arg(args, 1) as usize;
    let slot = match ctx.heap.data(handle) {
        ObjData::Array(ArrayData::Int(v)) => Slot::Int(v[cursor]),
        ObjData::Array(ArrayData::Float(v)) => Slot::Float(v[cursor]),
        ObjData::Array(ArrayData::Ptr(v)) => Slot::Ptr(v[cursor]),
        ObjData::Map(MapData::IntInt(m)) => {
            Slot::Int(*nth_entry(m.values(), cursor))
        }
        ObjData::Map(MapData::IntFloat(m)) => {
            Slot::Float(nth_entry(m.values(), cursor).0)
        }
        ObjData::Map(MapData::IntPtr(m)) => Slot::Ptr(*nth_entry(m.values(), cursor)),
        ObjData::Map(MapData::PtrInt(m)) => Slot::Int(*nth_entry(m.values(), cursor)),
        ObjData::Map(MapData::PtrFloat(m)) => {
            Slot::Float(nth_entry(m.values(), cursor).0)
        }
        ObjData::Map(MapData::PtrPtr(m)) => Slot::Ptr(*nth_entry(m.values(), cursor)),
        _ => return Err(RuntimeError::NoSuchOperator),
    };
    Ok(slot)
}

/// The key under the cursor: the running index for arrays, the entry key for
/// maps.
pub fn rt_iter_key(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let cursor = int_arg(args, 1) as usize;
    let slot = match ctx.heap.data(handle) {
        ObjData::Array(_) => Slot::Int(cursor as i64),
        ObjData::Map(MapData::IntInt(m)) => Slot::Int(*nth_entry(m.keys(), cursor)),
        ObjData::Map(MapData::IntFloat(m)) => Slot::Int(*nth_entry(m.keys(), cursor)),
        ObjData::Map(MapData::IntPtr(m)) => Slot::Int(*nth_entry(m.keys(), cursor)),
        ObjData::Map(MapData::PtrInt(m)) => Slot::Ptr(*nth_entry(m.keys(), cursor)),
        ObjData::Map(MapData::PtrFloat(m)) => Slot::Ptr(*nth_entry(m.keys(), cursor)),
        ObjData::Map(MapData::PtrPtr(m)) => Slot::Ptr(*nth_entry(m.keys(), cursor)),
        _ => return Err(RuntimeError::NoSuchOperator),
    };
    Ok(slot)
}

fn nth_entry<'a, T, I: Iterator<Item = &'a T>>(mut iter: I, n: usize) -> &'a T {
    match iter.nth(n) {
        Some(item) => item,
        None => panic!("iteration cursor out of range"),
    }
}

/// Initial place value for the decimal-digit cursor of a numeric range:
/// the highest power of ten not exceeding the magnitude.
pub fn rt_digits_place(_ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let mut n = int_arg(args, 0).unsigned_abs();
    let mut place: i64 = 1;
    while n >= 10 {
        n /= 10;
        place *= 10;
    }
    Ok(Slot::Int(place))
}

// ============================================================================
// Containers and boxing
// ============================================================================

pub fn rt_array_new_int(ctx: &mut RuntimeCtx, _args: &[Slot]) -> Result<Slot, RuntimeError> {
    Ok(Slot::Ptr(ctx.heap.allocate(ObjData::Array(ArrayData::Int(Vec::new())))))
}

pub fn rt_array_new_float(ctx: &mut RuntimeCtx, _args: &[Slot]) -> Result<Slot, RuntimeError> {
    Ok(Slot::Ptr(ctx.heap.allocate(ObjData::Array(ArrayData::Float(Vec::new())))))
}

pub fn rt_array_new_ptr(ctx: &mut RuntimeCtx, _args: &[Slot]) -> Result<Slot, RuntimeError> {
    Ok(Slot::Ptr(ctx.heap.allocate(ObjData::Array(ArrayData::Ptr(Vec::new())))))
}

pub fn rt_array_push_int(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let value = int_arg(args, 1);
    match ctx.heap.data_mut(handle) {
        ObjData::Array(ArrayData::Int(v)) => v.push(value),
        other => panic!("push_int into {other:?}"),
    }
    Ok(Slot::Void)
}

pub fn rt_array_push_float(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let value = float_arg(args, 1);
    match ctx.heap.data_mut(handle) {
        ObjData::Array(ArrayData::Float(v)) => v.push(value),
        other => panic!("push_float into {other:?}"),
    }
    Ok(Slot::Void)
}

/// Storing into a container takes one owning reference on the stored value;
/// if it was a temporary, the caller's trailing release becomes a no-op and
/// ownership has transferred.
pub fn rt_array_push_ptr(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let value = ptr_arg(args, 1);
    ctx.heap.acquire(value);
    match ctx.heap.data_mut(handle) {
        ObjData::Array(ArrayData::Ptr(v)) => v.push(value),
        other => panic!("push_ptr into {other:?}"),
    }
    Ok(Slot::Void)
}

/// Number of elements in an array.
pub fn rt_array_size(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let len = match ctx.heap.data(handle) {
        ObjData::Array(ArrayData::Int(v)) => v.len(),
        ObjData::Array(ArrayData::Float(v)) => v.len(),
        ObjData::Array(ArrayData::Ptr(v)) => v.len(),
        _ => return Err(RuntimeError::NoSuchOperator),
    };
    Ok(Slot::Int(len as i64))
}

/// Indexed read with bounds checking.
pub fn rt_array_at_int(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let index = int_arg(args, 1);
    if index < 0 {
        return Err(RuntimeError::ArrayOutOfBounds);
    }
    let index = index as usize;
    let slot = match ctx.heap.data(handle) {
        ObjData::Array(ArrayData::Int(v)) => {
            Slot::Int(*v.get(index).ok_or(RuntimeError::ArrayOutOfBounds)?)
        }
        ObjData::Array(ArrayData::Float(v)) => {
            Slot::Float(*v.get(index).ok_or(RuntimeError::ArrayOutOfBounds)?)
        }
        ObjData::Array(ArrayData::Ptr(v)) => {
            Slot::Ptr(*v.get(index).ok_or(RuntimeError::ArrayOutOfBounds)?)
        }
        _ => return Err(RuntimeError::NoSuchOperator),
    };
    Ok(slot)
}

/// Dynamic indexed read: the key is a boxed value and must be a number.
pub fn rt_array_at_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let handle = ptr_arg(args, 0);
    let key = ptr_arg(args, 1);
    let index = match ctx.heap.data(key) {
        ObjData::Number(n) => *n as i64,
        _ => return Err(RuntimeError::ArrayKeyIsNotNumber),
    };
    rt_array_at_int(ctx, &[Slot::Ptr(handle), Slot::Int(index)])
}

pub fn rt_box_int(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let value = int_arg(args, 0);
    Ok(Slot::Ptr(ctx.heap.allocate(ObjData::Number(value as f64))))
}

pub fn rt_box_float(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let value = float_arg(args, 0);
    Ok(Slot::Ptr(ctx.heap.allocate(ObjData::Number(value))))
}

/// Booleans box to the shared singletons; no allocation.
pub fn rt_box_bool(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let value = int_arg(args, 0) != 0;
    Ok(Slot::Ptr(ctx.heap.bool_handle(value)))
}

// ============================================================================
// Object attributes
// ============================================================================

fn string_data(ctx: &RuntimeCtx, handle: Handle) -> String {
    match ctx.heap.data(handle) {
        ObjData::String(s) => s.clone(),
        other => panic!("attribute name must be a string, got {other:?}"),
    }
}

/// Read a field; the result is a borrowed view into the object.
pub fn rt_attr_get(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let object = ptr_arg(args, 0);
    let name = string_data(ctx, ptr_arg(args, 1));
    match ctx.heap.data(object) {
        ObjData::Object(data) => data
            .fields
            .get(&name)
            .map(|&h| Slot::Ptr(h))
            .ok_or(RuntimeError::NoSuchAttribute),
        _ => Err(RuntimeError::NoSuchAttribute),
    }
}

/// Field store: acquires the new value, releases the previous one.
pub fn rt_attr_set(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let object = ptr_arg(args, 0);
    let name = string_data(ctx, ptr_arg(args, 1));
    let value = ptr_arg(args, 2);
    ctx.heap.acquire(value);
    let previous = match ctx.heap.data_mut(object) {
        ObjData::Object(data) => {
            if data.readonly {
                return Err(RuntimeError::CantModifyReadonlyObject);
            }
            data.fields.insert(name, value)
        }
        _ => return Err(RuntimeError::NoSuchAttribute),
    };
    if let Some(previous) = previous {
        ctx.heap.release(previous);
    }
    Ok(Slot::Void)
}

// ============================================================================
// Dynamic operators
// ============================================================================

pub fn rt_add_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::add(&mut ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1))?;
    Ok(Slot::Ptr(r))
}

pub fn rt_sub_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::sub(&mut ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1))?;
    Ok(Slot::Ptr(r))
}

pub fn rt_mul_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::mul(&mut ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1))?;
    Ok(Slot::Ptr(r))
}

pub fn rt_div_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::div(&mut ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1))?;
    Ok(Slot::Ptr(r))
}

pub fn rt_rem_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::rem(&mut ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1))?;
    Ok(Slot::Ptr(r))
}

pub fn rt_eq_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::eq(&ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1));
    Ok(Slot::Int(r as i64))
}

pub fn rt_lt_any(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let r = value_ops::lt(&ctx.heap, ptr_arg(args, 0), ptr_arg(args, 1));
    Ok(Slot::Int(r as i64))
}

// ============================================================================
// Output
// ============================================================================

pub fn rt_print_int(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let line = int_arg(args, 0).to_string();
    ctx.output.push(line);
    Ok(Slot::Void)
}

pub fn rt_print_float(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let line = value_ops::format_number(float_arg(args, 0));
    ctx.output.push(line);
    Ok(Slot::Void)
}

pub fn rt_print_ptr(ctx: &mut RuntimeCtx, args: &[Slot]) -> Result<Slot, RuntimeError> {
    let line = value_ops::format_value(&ctx.heap, ptr_arg(args, 0));
    ctx.output.push(line);
    Ok(Slot::Void)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ObjectData, RuntimeCtx, Shape};

    #[test]
    fn digits_place_of_magnitudes() {
        let mut ctx = RuntimeCtx::new();
        let mut place = |n: i64| {
            match rt_digits_place(&mut ctx, &[Slot::Int(n)]) {
                Ok(Slot::Int(p)) => p,
                other => panic!("unexpected {other:?}"),
            }
        };
        assert_eq!(place(0), 1);
        assert_eq!(place(7), 1);
        assert_eq!(place(12), 10);
        assert_eq!(place(999), 100);
        assert_eq!(place(-451), 100);
    }

    #[test]
    fn operation_budget_raises_when_exceeded() {
        let mut ctx = RuntimeCtx::with_limit(10);
        assert!(rt_check_operations(&mut ctx, &[Slot::Int(10)]).is_ok());
        assert_eq!(
            rt_check_operations(&mut ctx, &[Slot::Int(1)]),
            Err(RuntimeError::OperationLimitExceeded)
        );
    }

    #[test]
    fn selector_maps_shapes_and_rejects_others() {
        let mut ctx = RuntimeCtx::new();
        let arr = ctx.heap.allocate(ObjData::Array(ArrayData::Int(vec![1])));
        let interval = ctx.heap.allocate(ObjData::Interval(0, 5));
        assert_eq!(
            rt_shape_selector(&mut ctx, &[Slot::Ptr(arr)]),
            Ok(Slot::Int(u8::from(Shape::IntArray) as i64))
        );
        assert_eq!(
            rt_shape_selector(&mut ctx, &[Slot::Ptr(interval)]),
            Ok(Slot::Int(SHAPE_COUNT as i64))
        );
    }

    #[test]
    fn attr_set_respects_readonly() {
        let mut ctx = RuntimeCtx::new();
        let obj = ctx.heap.allocate(ObjData::Object(ObjectData {
            class_name: "Point".into(),
            fields: Default::default(),
            readonly: true,
        }));
        let name = ctx.heap.allocate(ObjData::String("x".into()));
        let value = ctx.heap.allocate(ObjData::Number(1.0));
        assert_eq!(
            rt_attr_set(&mut ctx, &[Slot::Ptr(obj), Slot::Ptr(name), Slot::Ptr(value)]),
            Err(RuntimeError::CantModifyReadonlyObject)
        );
    }

    #[test]
    fn array_at_checks_bounds_and_key_kind() {
        let mut ctx = RuntimeCtx::new();
        let arr = ctx.heap.allocate(ObjData::Array(ArrayData::Int(vec![5, 6])));
        assert_eq!(
            rt_array_at_int(&mut ctx, &[Slot::Ptr(arr), Slot::Int(1)]),
            Ok(Slot::Int(6))
        );
        assert_eq!(
            rt_array_at_int(&mut ctx, &[Slot::Ptr(arr), Slot::Int(2)]),
            Err(RuntimeError::ArrayOutOfBounds)
        );
        let key = ctx.heap.allocate(ObjData::String("k".into()));
        assert_eq!(
            rt_array_at_any(&mut ctx, &[Slot::Ptr(arr), Slot::Ptr(key)]),
            Err(RuntimeError::ArrayKeyIsNotNumber)
        );
    }
}
