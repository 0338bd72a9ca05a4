use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::remember::RememberedHandle;
use crate::ScopeId;

/// A value stored in one slot of the table.
///
/// Equality is structural for plain data, identity for remembered objects,
/// and delegated to the host type for [`HostValue`]s. Floats compare by bit
/// pattern so a NaN input is stable across passes.
#[derive(Clone, Debug, Default)]
pub enum SlotValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    Remembered(RememberedHandle),
    Scope(ScopeId),
    Opaque(HostValue),
}

impl SlotValue {
    pub fn opaque<T: PartialEq + fmt::Debug + 'static>(value: T) -> Self {
        SlotValue::Opaque(HostValue::new(value))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SlotValue::Empty)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SlotValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SlotValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SlotValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn downcast_opaque<T: 'static>(&self) -> Option<&T> {
        match self {
            SlotValue::Opaque(value) => value.downcast_ref(),
            _ => None,
        }
    }
}

impl PartialEq for SlotValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SlotValue::Empty, SlotValue::Empty) => true,
            (SlotValue::Bool(a), SlotValue::Bool(b)) => a == b,
            (SlotValue::Int(a), SlotValue::Int(b)) => a == b,
            (SlotValue::Float(a), SlotValue::Float(b)) => a.to_bits() == b.to_bits(),
            (SlotValue::Text(a), SlotValue::Text(b)) => a == b,
            (SlotValue::Remembered(a), SlotValue::Remembered(b)) => a.ptr_eq(b),
            (SlotValue::Scope(a), SlotValue::Scope(b)) => a == b,
            (SlotValue::Opaque(a), SlotValue::Opaque(b)) => a.dyn_eq(b),
            _ => false,
        }
    }
}

macro_rules! int_slot_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SlotValue {
                fn from(value: $ty) -> Self {
                    SlotValue::Int(value as i64)
                }
            }
        )*
    };
}

// `as` is a bijection for u64 and usize into i64, so equality is preserved.
int_slot_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<bool> for SlotValue {
    fn from(value: bool) -> Self {
        SlotValue::Bool(value)
    }
}

impl From<f32> for SlotValue {
    fn from(value: f32) -> Self {
        SlotValue::Float(value as f64)
    }
}

impl From<f64> for SlotValue {
    fn from(value: f64) -> Self {
        SlotValue::Float(value)
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        SlotValue::Text(Rc::from(value))
    }
}

impl From<String> for SlotValue {
    fn from(value: String) -> Self {
        SlotValue::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for SlotValue {
    fn from(value: Rc<str>) -> Self {
        SlotValue::Text(value)
    }
}

impl From<()> for SlotValue {
    fn from(_: ()) -> Self {
        SlotValue::Empty
    }
}

impl From<HostValue> for SlotValue {
    fn from(value: HostValue) -> Self {
        SlotValue::Opaque(value)
    }
}

trait DynValue: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynValue) -> bool;
}

impl<T: PartialEq + fmt::Debug + 'static> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// Host-defined input value compared with the host type's own `PartialEq`.
#[derive(Clone)]
pub struct HostValue(Rc<dyn DynValue>);

impl HostValue {
    pub fn new<T: PartialEq + fmt::Debug + 'static>(value: T) -> Self {
        HostValue(Rc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    fn dyn_eq(&self, other: &HostValue) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
