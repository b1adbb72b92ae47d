//! Binary operations over boxed values.
//!
//! The runtime kind set is closed, so every binary operation is a single
//! exhaustive match over the operand payloads instead of double dispatch.
//! Unsupported combinations raise [`RuntimeError::NoSuchOperator`]; results
//! are always freshly allocated temporaries, never aliases of the operands.

use ordered_float::OrderedFloat;

use crate::error::RuntimeError;

use super::heap::{ArrayData, Handle, Heap, MapData, ObjData, SetData};

/// Rank used to order values of different kinds, mirroring the runtime
/// type-id ordering of the value hierarchy.
pub fn type_rank(data: &ObjData) -> u8 {
    match data {
        ObjData::Null => 1,
        ObjData::Boolean(_) => 2,
        ObjData::Number(_) => 3,
        ObjData::String(_) => 4,
        ObjData::Array(_) | ObjData::Interval(_, _) => 5,
        ObjData::Map(_) => 6,
        ObjData::Set(_) => 7,
        ObjData::Function(_) => 8,
        ObjData::Object(_) => 9,
        ObjData::Class(_) => 10,
    }
}

/// Numeric view of a payload, when it has one.
fn as_number(data: &ObjData) -> Option<f64> {
    match data {
        ObjData::Number(n) => Some(*n),
        ObjData::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// `a + b` over boxed values.
pub fn add(heap: &mut Heap, a: Handle, b: Handle) -> Result<Handle, RuntimeError> {
    let out = {
        let da = heap.data(a);
        let db = heap.data(b);
        match (da, db) {
            (ObjData::String(l), ObjData::String(r)) => {
                ObjData::String(format!("{l}{r}"))
            }
            (ObjData::String(l), r) => ObjData::String(format!("{l}{}", format_data(heap, r))),
            (l, ObjData::String(r)) => ObjData::String(format!("{}{r}", format_data(heap, l))),
            (ObjData::Array(ArrayData::Int(l)), ObjData::Array(ArrayData::Int(r))) => {
                let mut out = l.clone();
                out.extend_from_slice(r);
                ObjData::Array(ArrayData::Int(out))
            }
            (ObjData::Array(ArrayData::Float(l)), ObjData::Array(ArrayData::Float(r))) => {
                let mut out = l.clone();
                out.extend_from_slice(r);
                ObjData::Array(ArrayData::Float(out))
            }
            (l, r) => match (as_number(l), as_number(r)) {
                (Some(x), Some(y)) => ObjData::Number(x + y),
                _ => return Err(RuntimeError::NoSuchOperator),
            },
        }
    };
    Ok(heap.allocate(out))
}

/// `a - b` over boxed values.
pub fn sub(heap: &mut Heap, a: Handle, b: Handle) -> Result<Handle, RuntimeError> {
    numeric_op(heap, a, b, |x, y| Ok(x - y))
}

/// `a * b` over boxed values.
pub fn mul(heap: &mut Heap, a: Handle, b: Handle) -> Result<Handle, RuntimeError> {
    let out = {
        let da = heap.data(a);
        let db = heap.data(b);
        match (da, db) {
            (ObjData::String(s), ObjData::Number(n)) => {
                if *n < 0.0 {
                    return Err(RuntimeError::NoSuchOperator);
                }
                ObjData::String(s.repeat(*n as usize))
            }
            (l, r) => match (as_number(l), as_number(r)) {
                (Some(x), Some(y)) => ObjData::Number(x * y),
                _ => return Err(RuntimeError::NoSuchOperator),
            },
        }
    };
    Ok(heap.allocate(out))
}

/// `a / b` over boxed values.
pub fn div(heap: &mut Heap, a: Handle, b: Handle) -> Result<Handle, RuntimeError> {
    numeric_op(heap, a, b, |x, y| {
        if y == 0.0 {
            Err(RuntimeError::DivisionByZero)
        } else {
            Ok(x / y)
        }
    })
}

/// `a % b` over boxed values.
pub fn rem(heap: &mut Heap, a: Handle, b: Handle) -> Result<Handle, RuntimeError> {
    numeric_op(heap, a, b, |x, y| {
        if y == 0.0 {
            Err(RuntimeError::DivisionByZero)
        } else {
            Ok(x % y)
        }
    })
}

fn numeric_op(
    heap: &mut Heap,
    a: Handle,
    b: Handle,
    op: impl Fn(f64, f64) -> Result<f64, RuntimeError>,
) -> Result<Handle, RuntimeError> {
    let result = {
        let x = as_number(heap.data(a)).ok_or(RuntimeError::NoSuchOperator)?;
        let y = as_number(heap.data(b)).ok_or(RuntimeError::NoSuchOperator)?;
        op(x, y)?
    };
    Ok(heap.allocate(ObjData::Number(result)))
}

/// Structural equality across boxed values.
pub fn eq(heap: &Heap, a: Handle, b: Handle) -> bool {
    if a == b {
        return true;
    }
    let da = heap.data(a);
    let db = heap.data(b);
    match (da, db) {
        (ObjData::Null, ObjData::Null) => true,
        (ObjData::Boolean(l), ObjData::Boolean(r)) => l == r,
        (ObjData::Number(l), ObjData::Number(r)) => l == r,
        (ObjData::String(l), ObjData::String(r)) => l == r,
        (ObjData::Interval(l0, l1), ObjData::Interval(r0, r1)) => l0 == r0 && l1 == r1,
        (ObjData::Array(ArrayData::Int(l)), ObjData::Array(ArrayData::Int(r))) => l == r,
        (ObjData::Array(ArrayData::Float(l)), ObjData::Array(ArrayData::Float(r))) => l == r,
        (ObjData::Array(ArrayData::Ptr(l)), ObjData::Array(ArrayData::Ptr(r))) => {
            l.len() == r.len() && l.iter().zip(r).all(|(&x, &y)| eq(heap, x, y))
        }
        (ObjData::Set(SetData::Int(l)), ObjData::Set(SetData::Int(r))) => l == r,
        (ObjData::Set(SetData::Float(l)), ObjData::Set(SetData::Float(r))) => l == r,
        (ObjData::Map(MapData::IntInt(l)), ObjData::Map(MapData::IntInt(r))) => l == r,
        (ObjData::Map(MapData::IntFloat(l)), ObjData::Map(MapData::IntFloat(r))) => l == r,
        (ObjData::Function(l), ObjData::Function(r)) => l == r,
        (ObjData::Class(l), ObjData::Class(r)) => l == r,
        (ObjData::Object(l), ObjData::Object(r)) => {
            l.class_name == r.class_name
                && l.fields.len() == r.fields.len()
                && l.fields
                    .iter()
                    .zip(r.fields.iter())
                    .all(|((lk, &lv), (rk, &rv))| lk == rk && eq(heap, lv, rv))
        }
        _ => false,
    }
}

/// Strict ordering across boxed values: kinds order by rank first, values of
/// the same kind by their payload.
pub fn lt(heap: &Heap, a: Handle, b: Handle) -> bool {
    let da = heap.data(a);
    let db = heap.data(b);
    let (ra, rb) = (type_rank(da), type_rank(db));
    if ra != rb {
        return ra < rb;
    }
    match (da, db) {
        (ObjData::Boolean(l), ObjData::Boolean(r)) => !*l && *r,
        (ObjData::Number(l), ObjData::Number(r)) => OrderedFloat(*l) < OrderedFloat(*r),
        (ObjData::String(l), ObjData::String(r)) => l < r,
        (ObjData::Array(ArrayData::Int(l)), ObjData::Array(ArrayData::Int(r))) => l < r,
        (ObjData::Array(ArrayData::Float(l)), ObjData::Array(ArrayData::Float(r))) => {
            l.iter().map(|&x| OrderedFloat(x)).lt(r.iter().map(|&x| OrderedFloat(x)))
        }
        _ => false,
    }
}

/// Truthiness of a boxed value.
pub fn is_truthy(heap: &Heap, handle: Handle) -> bool {
    match heap.data(handle) {
        ObjData::Null => false,
        ObjData::Boolean(b) => *b,
        ObjData::Number(n) => *n != 0.0,
        ObjData::String(s) => !s.is_empty(),
        ObjData::Array(ArrayData::Int(v)) => !v.is_empty(),
        ObjData::Array(ArrayData::Float(v)) => !v.is_empty(),
        ObjData::Array(ArrayData::Ptr(v)) => !v.is_empty(),
        ObjData::Set(SetData::Int(s)) => !s.is_empty(),
        ObjData::Set(SetData::Float(s)) => !s.is_empty(),
        ObjData::Set(SetData::Ptr(s)) => !s.is_empty(),
        ObjData::Map(m) => map_len(m) != 0,
        ObjData::Interval(start, end) => end > start,
        ObjData::Function(_) | ObjData::Class(_) | ObjData::Object(_) => true,
    }
}

pub fn map_len(map: &MapData) -> usize {
    match map {
        MapData::IntInt(m) => m.len(),
        MapData::IntFloat(m) => m.len(),
        MapData::IntPtr(m) => m.len(),
        MapData::PtrInt(m) => m.len(),
        MapData::PtrFloat(m) => m.len(),
        MapData::PtrPtr(m) => m.len(),
    }
}

/// Render a value the way program output does.
pub fn format_value(heap: &Heap, handle: Handle) -> String {
    format_data(heap, heap.data(handle))
}

fn format_data(heap: &Heap, data: &ObjData) -> String {
    match data {
        ObjData::Null => "null".to_string(),
        ObjData::Boolean(b) => b.to_string(),
        ObjData::Number(n) => format_number(*n),
        ObjData::String(s) => s.clone(),
        ObjData::Array(ArrayData::Int(v)) => {
            let items: Vec<String> = v.iter().map(|i| i.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
        ObjData::Array(ArrayData::Float(v)) => {
            let items: Vec<String> = v.iter().map(|f| format_number(*f)).collect();
            format!("[{}]", items.join(", "))
        }
        ObjData::Array(ArrayData::Ptr(v)) => {
            let items: Vec<String> = v.iter().map(|&h| format_value(heap, h)).collect();
            format!("[{}]", items.join(", "))
        }
        ObjData::Set(SetData::Int(s)) => {
            let items: Vec<String> = s.iter().map(|i| i.to_string()).collect();
            format!("<{}>", items.join(", "))
        }
        ObjData::Set(SetData::Float(s)) => {
            let items: Vec<String> = s.iter().map(|f| format_number(f.0)).collect();
            format!("<{}>", items.join(", "))
        }
        ObjData::Set(SetData::Ptr(s)) => {
            let items: Vec<String> = s.iter().map(|&h| format_value(heap, h)).collect();
            format!("<{}>", items.join(", "))
        }
        ObjData::Map(map) => format_map(heap, map),
        ObjData::Interval(start, end) => format!("[{start}..{end}]"),
        ObjData::Object(object) => {
            let fields: Vec<String> = object
                .fields
                .iter()
                .map(|(name, &h)| format!("{name}: {}", format_value(heap, h)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        ObjData::Class(name) => format!("<class {name}>"),
        ObjData::Function(index) => format!("<function {index}>"),
    }
}

fn format_map(heap: &Heap, map: &MapData) -> String {
    let entries: Vec<String> = match map {
        MapData::IntInt(m) => m.iter().map(|(k, v)| format!("{k}: {v}")).collect(),
        MapData::IntFloat(m) => m
            .iter()
            .map(|(k, v)| format!("{k}: {}", format_number(v.0)))
            .collect(),
        MapData::IntPtr(m) => m
            .iter()
            .map(|(k, &v)| format!("{k}: {}", format_value(heap, v)))
            .collect(),
        MapData::PtrInt(m) => m
            .iter()
            .map(|(&k, v)| format!("{}: {v}", format_value(heap, k)))
            .collect(),
        MapData::PtrFloat(m) => m
            .iter()
            .map(|(&k, v)| format!("{}: {}", format_value(heap, k), format_number(v.0)))
            .collect(),
        MapData::PtrPtr(m) => m
            .iter()
            .map(|(&k, &v)| {
                format!("{}: {}", format_value(heap, k), format_value(heap, v))
            })
            .collect(),
    };
    format!("[{}]", entries.join(", "))
}

/// Whole numbers print without a decimal point.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_numbers() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::Number(2.0));
        let b = heap.allocate(ObjData::Number(0.5));
        let r = add(&mut heap, a, b).unwrap();
        assert_eq!(heap.data(r), &ObjData::Number(2.5));
    }

    #[test]
    fn add_strings_concatenates() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::String("foo".into()));
        let b = heap.allocate(ObjData::String("bar".into()));
        let r = add(&mut heap, a, b).unwrap();
        assert_eq!(heap.data(r), &ObjData::String("foobar".into()));
    }

    #[test]
    fn add_string_and_number() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::String("n=".into()));
        let b = heap.allocate(ObjData::Number(3.0));
        let r = add(&mut heap, a, b).unwrap();
        assert_eq!(heap.data(r), &ObjData::String("n=3".into()));
    }

    #[test]
    fn add_unrelated_kinds_is_no_such_operator() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::Interval(0, 3));
        let b = heap.allocate(ObjData::Number(1.0));
        assert_eq!(add(&mut heap, a, b), Err(RuntimeError::NoSuchOperator));
    }

    #[test]
    fn div_by_zero() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::Number(1.0));
        let b = heap.allocate(ObjData::Number(0.0));
        assert_eq!(div(&mut heap, a, b), Err(RuntimeError::DivisionByZero));
    }

    #[test]
    fn eq_is_structural() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::Array(ArrayData::Int(vec![1, 2])));
        let b = heap.allocate(ObjData::Array(ArrayData::Int(vec![1, 2])));
        assert!(eq(&heap, a, b));
    }

    #[test]
    fn lt_orders_by_kind_first() {
        let mut heap = Heap::new();
        let null = heap.null_handle();
        let n = heap.allocate(ObjData::Number(0.0));
        let s = heap.allocate(ObjData::String("a".into()));
        assert!(lt(&heap, null, n));
        assert!(lt(&heap, n, s));
        assert!(!lt(&heap, s, n));
    }

    #[test]
    fn numbers_format_like_integers_when_whole() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
    }
}
