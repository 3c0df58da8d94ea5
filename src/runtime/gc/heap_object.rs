use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    mem::size_of,
};

use crate::runtime::{
    class::{Class, ClassInstance},
    closure::{ClassClosureBind, Closure},
    function::Function,
    gc::GcHandle,
    module::{EnumObject, ModuleObject},
    native_function::NativeFunction,
    reference::{RefTarget, Reference},
    upvalue::{UpValue, UpValueState},
    value::{Member, Value},
};

/// Objects that live on the GC-managed heap.
#[derive(Debug, Clone)]
pub enum HeapObject {
    Str(String),
    Array(Vec<Value>),
    /// Keys hash numerically for scalars and by identity for objects.
    Dict(HashMap<Value, Value>),
    Struct(BTreeMap<String, Value>),
    Function(Function),
    UpValue(UpValue),
    Closure(Closure),
    Native(NativeFunction),
    Ref(Reference),
    Class(Class),
    ClassInstance(ClassInstance),
    ClassClosureBind(ClassClosureBind),
    Enum(EnumObject),
    Module(ModuleObject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Str,
    Array,
    Dict,
    Struct,
    Function,
    UpValue,
    Closure,
    Native,
    Ref,
    Class,
    ClassInstance,
    ClassClosureBind,
    Enum,
    Module,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Str => "string",
            ObjectKind::Array => "array",
            ObjectKind::Dict => "dict",
            ObjectKind::Struct => "struct",
            ObjectKind::Function => "function",
            ObjectKind::UpValue => "upvalue",
            ObjectKind::Closure => "closure",
            ObjectKind::Native => "native function",
            ObjectKind::Ref => "reference",
            ObjectKind::Class => "class",
            ObjectKind::ClassInstance => "class instance",
            ObjectKind::ClassClosureBind => "bound method",
            ObjectKind::Enum => "enum",
            ObjectKind::Module => "module",
        };
        f.write_str(name)
    }
}

fn push_value(value: &Value, out: &mut Vec<GcHandle>) {
    if let Value::Object(handle) = value {
        out.push(*handle);
    }
}

fn push_members<'a>(members: impl Iterator<Item = &'a Member>, out: &mut Vec<GcHandle>) {
    for member in members {
        push_value(&member.value, out);
    }
}

impl HeapObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Str(_) => ObjectKind::Str,
            HeapObject::Array(_) => ObjectKind::Array,
            HeapObject::Dict(_) => ObjectKind::Dict,
            HeapObject::Struct(_) => ObjectKind::Struct,
            HeapObject::Function(_) => ObjectKind::Function,
            HeapObject::UpValue(_) => ObjectKind::UpValue,
            HeapObject::Closure(_) => ObjectKind::Closure,
            HeapObject::Native(_) => ObjectKind::Native,
            HeapObject::Ref(_) => ObjectKind::Ref,
            HeapObject::Class(_) => ObjectKind::Class,
            HeapObject::ClassInstance(_) => ObjectKind::ClassInstance,
            HeapObject::ClassClosureBind(_) => ObjectKind::ClassClosureBind,
            HeapObject::Enum(_) => ObjectKind::Enum,
            HeapObject::Module(_) => ObjectKind::Module,
        }
    }

    /// Pushes every handle this object references onto `out`.
    ///
    /// This is the blacken step of the collector; it never follows the
    /// handles itself.
    pub fn trace(&self, out: &mut Vec<GcHandle>) {
        match self {
            HeapObject::Str(_) | HeapObject::Native(_) => {}
            HeapObject::Array(elements) => elements.iter().for_each(|v| push_value(v, out)),
            HeapObject::Dict(entries) => {
                for (key, value) in entries {
                    push_value(key, out);
                    push_value(value, out);
                }
            }
            HeapObject::Struct(fields) => fields.values().for_each(|v| push_value(v, out)),
            HeapObject::Function(function) => {
                function
                    .chunk
                    .constants
                    .iter()
                    .for_each(|v| push_value(v, out));
                for results in function.cache.values() {
                    results.iter().for_each(|v| push_value(v, out));
                }
            }
            HeapObject::UpValue(upvalue) => {
                if let UpValueState::Closed(value) = &upvalue.state {
                    push_value(value, out);
                }
                if let Some(next) = upvalue.next {
                    out.push(next);
                }
            }
            HeapObject::Closure(closure) => {
                out.push(closure.function);
                out.extend(closure.upvalues.iter().copied());
            }
            HeapObject::Ref(reference) => match &reference.target {
                RefTarget::Stack(_) | RefTarget::Global(_) => {}
                RefTarget::UpValue(upvalue) => out.push(*upvalue),
                RefTarget::ArrayElement { array, .. } => out.push(*array),
                RefTarget::DictEntry { dict, key } => {
                    out.push(*dict);
                    push_value(key, out);
                }
            },
            HeapObject::Class(class) => {
                out.extend(class.parents.iter().map(|(_, parent)| *parent));
                push_members(class.default_members.values(), out);
                push_members(class.functions.values(), out);
                push_members(class.enums.values(), out);
                out.extend(class.constructors.values().copied());
            }
            HeapObject::ClassInstance(instance) => {
                out.push(instance.class);
                push_members(instance.members.values(), out);
            }
            HeapObject::ClassClosureBind(bind) => {
                push_value(&bind.receiver, out);
                out.push(bind.closure);
            }
            HeapObject::Enum(enumeration) => {
                enumeration.cases.values().for_each(|v| push_value(v, out))
            }
            HeapObject::Module(module) => push_members(module.members.values(), out),
        }
    }

    /// Estimates the shallow byte size of this object including owned
    /// buffers. Drives the collection threshold.
    pub fn shallow_size_bytes(&self) -> usize {
        let base = size_of::<Self>();
        match self {
            HeapObject::Str(s) => base + s.capacity(),
            HeapObject::Array(elements) => base + elements.capacity() * size_of::<Value>(),
            HeapObject::Dict(entries) => {
                base + entries.capacity() * size_of::<(Value, Value)>()
            }
            HeapObject::Struct(fields) => {
                base + fields
                    .keys()
                    .map(|k| k.capacity() + size_of::<Value>())
                    .sum::<usize>()
            }
            HeapObject::Function(function) => {
                base + function.chunk.code.capacity()
                    + function.chunk.constants.capacity() * size_of::<Value>()
                    + function
                        .cache
                        .values()
                        .map(|v| v.capacity() * size_of::<Value>())
                        .sum::<usize>()
            }
            HeapObject::Closure(closure) => {
                base + closure.upvalues.capacity() * size_of::<GcHandle>()
            }
            HeapObject::Class(class) => {
                base + (class.default_members.len()
                    + class.functions.len()
                    + class.enums.len())
                    * size_of::<(String, Member)>()
                    + class.parents.capacity() * size_of::<(String, GcHandle)>()
            }
            HeapObject::ClassInstance(instance) => {
                base + instance.members.len() * size_of::<(String, Member)>()
            }
            HeapObject::Enum(enumeration) => {
                base + enumeration.cases.len() * size_of::<(String, Value)>()
            }
            HeapObject::Module(module) => {
                base + module.members.len() * size_of::<(String, Member)>()
            }
            HeapObject::UpValue(_)
            | HeapObject::Native(_)
            | HeapObject::Ref(_)
            | HeapObject::ClassClosureBind(_) => base,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeapObject::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            HeapObject::Array(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            HeapObject::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut Function> {
        match self {
            HeapObject::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            HeapObject::Closure(closure) => Some(closure),
            _ => None,
        }
    }

    pub fn as_upvalue(&self) -> Option<&UpValue> {
        match self {
            HeapObject::UpValue(upvalue) => Some(upvalue),
            _ => None,
        }
    }

    pub fn as_upvalue_mut(&mut self) -> Option<&mut UpValue> {
        match self {
            HeapObject::UpValue(upvalue) => Some(upvalue),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Class> {
        match self {
            HeapObject::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            HeapObject::Ref(reference) => Some(reference),
            _ => None,
        }
    }
}

impl From<String> for HeapObject {
    fn from(s: String) -> Self {
        HeapObject::Str(s)
    }
}

impl From<&str> for HeapObject {
    fn from(s: &str) -> Self {
        HeapObject::Str(s.to_string())
    }
}

impl From<Function> for HeapObject {
    fn from(function: Function) -> Self {
        HeapObject::Function(function)
    }
}
