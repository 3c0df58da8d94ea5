use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
};

use crate::runtime::gc::gc_handle::GcHandle;

/// Size in bytes of a serialized scalar value: kind, permission, payload.
pub const VALUE_BYTES: usize = 10;

/// Runtime value used by the VM stack, globals, constants and object fields.
///
/// Scalars are stored inline; everything else lives on the [`GcHeap`] and is
/// addressed through a [`GcHandle`].
///
/// `PartialEq` and `Hash` here are the *key* semantics used by dictionaries:
/// numbers compare across `Int`/`Real` by numeric value and objects compare
/// by identity. Language-level `==`, which compares objects structurally,
/// needs the heap and lives in [`crate::runtime::object::values_equal`].
///
/// [`GcHeap`]: crate::runtime::gc::GcHeap
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Real(f64),
    Bool(bool),
    Object(GcHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Nil = 0,
    Int = 1,
    Real = 2,
    Bool = 3,
    Object = 4,
}

/// Whether a named member may be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Permission {
    #[default]
    Mutable = 0,
    Immutable = 1,
}

/// A value stored in a class, instance or module member table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Member {
    pub value: Value,
    pub permission: Permission,
}

impl Member {
    pub fn mutable(value: Value) -> Self {
        Self {
            value,
            permission: Permission::Mutable,
        }
    }

    pub fn immutable(value: Value) -> Self {
        Self {
            value,
            permission: Permission::Immutable,
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Int(_) => ValueKind::Int,
            Value::Real(_) => ValueKind::Real,
            Value::Bool(_) => ValueKind::Bool,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Bool(_) => "bool",
            Value::Object(_) => "object",
        }
    }

    pub fn as_handle(&self) -> Option<GcHandle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// `nil` and `false` are falsey; everything else is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Encodes a scalar as `[kind, permission, payload (8 bytes LE)]`.
    ///
    /// Returns `None` for object values, which have no stable encoding.
    pub fn serialize(&self, permission: Permission) -> Option<[u8; VALUE_BYTES]> {
        let payload: u64 = match self {
            Value::Nil => 0,
            Value::Int(v) => *v as u64,
            Value::Real(v) => v.to_bits(),
            Value::Bool(v) => *v as u64,
            Value::Object(_) => return None,
        };
        let mut bytes = [0u8; VALUE_BYTES];
        bytes[0] = self.kind() as u8;
        bytes[1] = permission as u8;
        bytes[2..].copy_from_slice(&payload.to_le_bytes());
        Some(bytes)
    }

    pub fn deserialize(bytes: &[u8]) -> Option<(Value, Permission)> {
        if bytes.len() < VALUE_BYTES {
            return None;
        }
        let permission = match bytes[1] {
            0 => Permission::Mutable,
            1 => Permission::Immutable,
            _ => return None,
        };
        let mut payload = [0u8; 8];
        payload.copy_from_slice(&bytes[2..VALUE_BYTES]);
        let payload = u64::from_le_bytes(payload);
        let value = match bytes[0] {
            0 => Value::Nil,
            1 => Value::Int(payload as i64),
            2 => Value::Real(f64::from_bits(payload)),
            3 => Value::Bool(payload != 0),
            _ => return None,
        };
        Some((value, permission))
    }

    /// Stable hash of a single value, consistent with `PartialEq`.
    pub fn hash_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Integral reals inside the i64 range hash and compare as integers.
fn real_as_int(v: f64) -> Option<i64> {
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Int(a), Value::Real(b)) | (Value::Real(b), Value::Int(a)) => {
                real_as_int(*b) == Some(*a)
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Nil => ValueKind::Nil.hash(state),
            Value::Int(v) => {
                ValueKind::Int.hash(state);
                v.hash(state);
            }
            Value::Real(v) => match real_as_int(*v) {
                Some(i) => {
                    ValueKind::Int.hash(state);
                    i.hash(state);
                }
                None => {
                    ValueKind::Real.hash(state);
                    let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
                    bits.hash(state);
                }
            },
            Value::Bool(v) => {
                ValueKind::Bool.hash(state);
                v.hash(state);
            }
            Value::Object(handle) => {
                ValueKind::Object.hash(state);
                handle.hash(state);
            }
        }
    }
}

/// Hash of an argument list, used as the function-result cache key.
pub fn hash_value_list(values: &[Value]) -> u64 {
    let mut seed = values.len() as u64;
    for value in values {
        seed ^= value
            .hash_code()
            .wrapping_add(0x9e37_79b9)
            .wrapping_add(seed << 6)
            .wrapping_add(seed >> 2);
    }
    seed
}

impl fmt::Display for Value {
    /// Scalar rendering; objects need the heap, see
    /// [`crate::runtime::object::render_value`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Object(handle) => write!(f, "<object {}>", handle),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<GcHandle> for Value {
    fn from(handle: GcHandle) -> Self {
        Value::Object(handle)
    }
}
