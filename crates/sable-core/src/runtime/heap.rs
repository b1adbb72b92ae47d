//! The managed heap: reference-counted runtime objects.
//!
//! Every boxed value lives in a [`Heap`] slot behind a generational
//! [`Handle`]. Objects start life as *temporaries* with a reference count of
//! zero; each owning reference (a variable, a container slot, an object
//! field) accounts for one count. Destruction happens exactly when the count
//! returns to zero for a non-native object. The null/true/false singletons
//! are native: they are allocated once per heap and never destroyed.
//!
//! The heap also keeps the created/destroyed counters the test harness uses
//! for leak detection; native singletons are excluded so balance checks
//! compare only managed allocations.

use std::collections::{BTreeMap, BTreeSet};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use ordered_float::OrderedFloat;

/// Handle to a heap-allocated object.
///
/// Generational: a stale handle (outliving its object) is detected instead of
/// resurrecting whatever reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

/// The payload of a heap object: a closed variant over the runtime kinds.
///
/// Binary operations over these are exhaustive matches (see `value_ops`)
/// rather than open double dispatch; the kind set is finite and the compiler
/// checks coverage.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjData {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(ArrayData),
    Map(MapData),
    Set(SetData),
    Interval(i64, i64),
    Object(ObjectData),
    Class(String),
    Function(u32),
}

/// Array storage, specialized by element representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Ptr(Vec<Handle>),
}

/// Map storage, specialized by key and value representation.
/// Ordered containers: iteration visits entries in key order.
#[derive(Debug, Clone, PartialEq)]
pub enum MapData {
    IntInt(BTreeMap<i64, i64>),
    IntFloat(BTreeMap<i64, OrderedFloat<f64>>),
    IntPtr(BTreeMap<i64, Handle>),
    PtrInt(BTreeMap<Handle, i64>),
    PtrFloat(BTreeMap<Handle, OrderedFloat<f64>>),
    PtrPtr(BTreeMap<Handle, Handle>),
}

/// Set storage, specialized by element representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SetData {
    Int(BTreeSet<i64>),
    Float(BTreeSet<OrderedFloat<f64>>),
    Ptr(BTreeSet<Handle>),
}

/// An object instance: named fields plus the class it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData {
    pub class_name: String,
    pub fields: BTreeMap<String, Handle>,
    pub readonly: bool,
}

/// The concrete element/key representation combination of a container,
/// used by the iteration protocol for static specialization and as the
/// dynamic-regime jump-table index.
///
/// The discriminant order is the selector order; `u8` conversions feed the
/// jump table directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Shape {
    PtrArray = 0,
    IntArray,
    FloatArray,
    PtrPtrMap,
    PtrIntMap,
    PtrFloatMap,
    IntPtrMap,
    IntIntMap,
    IntFloatMap,
}

/// Number of known shapes; the selector returns this for anything else.
pub const SHAPE_COUNT: usize = 9;

struct HeapSlot {
    generation: u32,
    refs: u32,
    native: bool,
    data: Option<ObjData>,
}

/// Slab storage for managed objects, with a free list and the
/// creation/destruction counters.
pub struct Heap {
    slots: Vec<HeapSlot>,
    free: Vec<u32>,
    pub objects_created: u64,
    pub objects_deleted: u64,
    null: Handle,
    true_: Handle,
    false_: Handle,
}

impl Heap {
    pub fn new() -> Self {
        let mut heap = Heap {
            slots: Vec::new(),
            free: Vec::new(),
            objects_created: 0,
            objects_deleted: 0,
            null: Handle {
                index: 0,
                generation: 0,
            },
            true_: Handle {
                index: 0,
                generation: 0,
            },
            false_: Handle {
                index: 0,
                generation: 0,
            },
        };
        heap.null = heap.allocate_native(ObjData::Null);
        heap.true_ = heap.allocate_native(ObjData::Boolean(true));
        heap.false_ = heap.allocate_native(ObjData::Boolean(false));
        heap
    }

    /// The shared null singleton.
    pub fn null_handle(&self) -> Handle {
        self.null
    }

    /// The shared true/false singletons.
    pub fn bool_handle(&self, value: bool) -> Handle {
        if value { self.true_ } else { self.false_ }
    }

    /// Allocate a managed object. The new object is a temporary: nobody owns
    /// it and its reference count is zero.
    pub fn allocate(&mut self, data: ObjData) -> Handle {
        self.objects_created += 1;
        self.allocate_slot(data, false)
    }

    fn allocate_native(&mut self, data: ObjData) -> Handle {
        self.allocate_slot(data, true)
    }

    fn allocate_slot(&mut self, data: ObjData, native: bool) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.refs = 0;
            slot.native = native;
            slot.data = Some(data);
            Handle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                refs: 0,
                native,
                data: Some(data),
            });
            Handle {
                index,
                generation: 0,
            }
        }
    }

    fn slot(&self, handle: Handle) -> Option<&HeapSlot> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation || slot.data.is_none() {
            return None;
        }
        Some(slot)
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut HeapSlot> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || slot.data.is_none() {
            return None;
        }
        Some(slot)
    }

    /// The object behind a handle, if it is still alive.
    pub fn get(&self, handle: Handle) -> Option<&ObjData> {
        self.slot(handle).and_then(|s| s.data.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ObjData> {
        self.slot_mut(handle).and_then(|s| s.data.as_mut())
    }

    /// The object behind a handle. A stale handle here is a memory-discipline
    /// violation in the code generator; fail fast.
    pub fn data(&self, handle: Handle) -> &ObjData {
        match self.get(handle) {
            Some(data) => data,
            None => panic!("stale handle {handle:?}: use after release"),
        }
    }

    pub fn data_mut(&mut self, handle: Handle) -> &mut ObjData {
        match self.get_mut(handle) {
            Some(data) => data,
            None => panic!("stale handle {handle:?}: use after release"),
        }
    }

    /// Current reference count (0 for a dead or stale handle).
    pub fn refs(&self, handle: Handle) -> u32 {
        self.slot(handle).map(|s| s.refs).unwrap_or(0)
    }

    pub fn is_native(&self, handle: Handle) -> bool {
        self.slot(handle).map(|s| s.native).unwrap_or(false)
    }

    pub fn is_alive(&self, handle: Handle) -> bool {
        self.slot(handle).is_some()
    }

    /// Take one owning reference.
    pub fn acquire(&mut self, handle: Handle) {
        if let Some(slot) = self.slot_mut(handle)
            && !slot.native
        {
            slot.refs += 1;
        }
    }

    /// Drop one owning reference; the object is destroyed when the last one
    /// goes. Releasing an unowned temporary consumes it.
    pub fn release(&mut self, handle: Handle) {
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };
        if slot.native {
            return;
        }
        if slot.refs > 1 {
            slot.refs -= 1;
        } else {
            self.destroy(handle);
        }
    }

    /// Destroy a temporary that was never stored anywhere. No effect on
    /// owned or native objects.
    pub fn release_temporary(&mut self, handle: Handle) {
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };
        if slot.native || slot.refs > 0 {
            return;
        }
        self.destroy(handle);
    }

    fn destroy(&mut self, handle: Handle) {
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };
        let data = slot.data.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.refs = 0;
        self.free.push(handle.index);
        self.objects_deleted += 1;
        if let Some(data) = data {
            for child in children(&data) {
                self.release(child);
            }
        }
    }

    /// Deep copy: an independent temporary with the same value. Native
    /// singletons are shared, not copied.
    pub fn clone_value(&mut self, handle: Handle) -> Handle {
        if self.is_native(handle) {
            return handle;
        }
        let data = self.data(handle).clone();
        let cloned = self.clone_data(data);
        self.allocate(cloned)
    }

    fn clone_data(&mut self, data: ObjData) -> ObjData {
        match data {
            ObjData::Array(ArrayData::Ptr(items)) => {
                let items = items.iter().map(|&h| self.clone_child(h)).collect();
                ObjData::Array(ArrayData::Ptr(items))
            }
            ObjData::Map(MapData::IntPtr(map)) => ObjData::Map(MapData::IntPtr(
                map.iter().map(|(&k, &v)| (k, self.clone_child(v))).collect(),
            )),
            ObjData::Map(MapData::PtrInt(map)) => ObjData::Map(MapData::PtrInt(
                map.iter().map(|(&k, &v)| (self.clone_child(k), v)).collect(),
            )),
            ObjData::Map(MapData::PtrFloat(map)) => ObjData::Map(MapData::PtrFloat(
                map.iter().map(|(&k, &v)| (self.clone_child(k), v)).collect(),
            )),
            ObjData::Map(MapData::PtrPtr(map)) => ObjData::Map(MapData::PtrPtr(
                map.iter()
                    .map(|(&k, &v)| (self.clone_child(k), self.clone_child(v)))
                    .collect(),
            )),
            ObjData::Set(SetData::Ptr(set)) => ObjData::Set(SetData::Ptr(
                set.iter().map(|&h| self.clone_child(h)).collect(),
            )),
            ObjData::Object(object) => {
                let fields = object
                    .fields
                    .iter()
                    .map(|(name, &h)| (name.clone(), self.clone_child(h)))
                    .collect();
                ObjData::Object(ObjectData {
                    class_name: object.class_name,
                    fields,
                    readonly: object.readonly,
                })
            }
            other => other,
        }
    }

    fn clone_child(&mut self, handle: Handle) -> Handle {
        // A cloned child is owned by exactly the new container.
        self.clone_value(handle)
    }

    /// The container shape of a live object, or None when it matches no
    /// known shape.
    pub fn shape_of(&self, handle: Handle) -> Option<Shape> {
        match self.get(handle)? {
            ObjData::Array(ArrayData::Ptr(_)) => Some(Shape::PtrArray),
            ObjData::Array(ArrayData::Int(_)) => Some(Shape::IntArray),
            ObjData::Array(ArrayData::Float(_)) => Some(Shape::FloatArray),
            ObjData::Map(MapData::PtrPtr(_)) => Some(Shape::PtrPtrMap),
            ObjData::Map(MapData::PtrInt(_)) => Some(Shape::PtrIntMap),
            ObjData::Map(MapData::PtrFloat(_)) => Some(Shape::PtrFloatMap),
            ObjData::Map(MapData::IntPtr(_)) => Some(Shape::IntPtrMap),
            ObjData::Map(MapData::IntInt(_)) => Some(Shape::IntIntMap),
            ObjData::Map(MapData::IntFloat(_)) => Some(Shape::IntFloatMap),
            _ => None,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles owned by a value's payload, released when it is destroyed.
fn children(data: &ObjData) -> Vec<Handle> {
    match data {
        ObjData::Array(ArrayData::Ptr(items)) => items.clone(),
        ObjData::Map(MapData::IntPtr(map)) => map.values().copied().collect(),
        ObjData::Map(MapData::PtrInt(map)) => map.keys().copied().collect(),
        ObjData::Map(MapData::PtrFloat(map)) => map.keys().copied().collect(),
        ObjData::Map(MapData::PtrPtr(map)) => {
            map.iter().flat_map(|(&k, &v)| [k, v]).collect()
        }
        ObjData::Set(SetData::Ptr(set)) => set.iter().copied().collect(),
        ObjData::Object(object) => object.fields.values().copied().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_objects_are_temporaries() {
        let mut heap = Heap::new();
        let h = heap.allocate(ObjData::Number(1.0));
        assert_eq!(heap.refs(h), 0);
        assert_eq!(heap.objects_created, 1);
        assert_eq!(heap.objects_deleted, 0);
    }

    #[test]
    fn release_destroys_at_zero() {
        let mut heap = Heap::new();
        let h = heap.allocate(ObjData::String("x".into()));
        heap.acquire(h);
        heap.acquire(h);
        heap.release(h);
        assert!(heap.is_alive(h));
        heap.release(h);
        assert!(!heap.is_alive(h));
        assert_eq!(heap.objects_deleted, 1);
    }

    #[test]
    fn release_temporary_only_destroys_unowned() {
        let mut heap = Heap::new();
        let owned = heap.allocate(ObjData::Number(2.0));
        heap.acquire(owned);
        heap.release_temporary(owned);
        assert!(heap.is_alive(owned));

        let temp = heap.allocate(ObjData::Number(3.0));
        heap.release_temporary(temp);
        assert!(!heap.is_alive(temp));
    }

    #[test]
    fn natives_are_never_destroyed() {
        let mut heap = Heap::new();
        let null = heap.null_handle();
        heap.release(null);
        heap.release_temporary(null);
        assert!(heap.is_alive(null));
        assert_eq!(heap.objects_deleted, 0);
    }

    #[test]
    fn destroying_a_container_releases_children() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::Number(1.0));
        let b = heap.allocate(ObjData::Number(2.0));
        // Stored children each hold the count the container owns.
        let arr = heap.allocate(ObjData::Array(ArrayData::Ptr(vec![a, b])));
        heap.release(arr);
        assert!(!heap.is_alive(a));
        assert!(!heap.is_alive(b));
        assert_eq!(heap.objects_created, 3);
        assert_eq!(heap.objects_deleted, 3);
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjData::Number(1.0));
        let arr = heap.allocate(ObjData::Array(ArrayData::Ptr(vec![a])));
        let copy = heap.clone_value(arr);
        assert_ne!(copy, arr);
        heap.release(arr);
        assert!(heap.is_alive(copy));
        match heap.data(copy) {
            ObjData::Array(ArrayData::Ptr(items)) => {
                assert_eq!(items.len(), 1);
                assert!(heap.is_alive(items[0]));
            }
            other => panic!("expected ptr array, got {other:?}"),
        }
        heap.release(copy);
        assert_eq!(heap.objects_created, heap.objects_deleted);
    }

    #[test]
    fn stale_handles_are_detected() {
        let mut heap = Heap::new();
        let h = heap.allocate(ObjData::Number(1.0));
        heap.release(h);
        // The slot may be reused; the generation must not match.
        let again = heap.allocate(ObjData::Number(2.0));
        assert_eq!(again.index, h.index);
        assert!(heap.get(h).is_none());
        assert!(heap.get(again).is_some());
        heap.release(again);
    }

    #[test]
    fn shapes_follow_selector_order() {
        assert_eq!(u8::from(Shape::PtrArray), 0);
        assert_eq!(u8::from(Shape::IntFloatMap), 8);
        assert_eq!(Shape::try_from(2u8), Ok(Shape::FloatArray));
        assert!(Shape::try_from(9u8).is_err());
    }
}
