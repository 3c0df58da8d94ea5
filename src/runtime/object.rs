//! Heap-aware operations on values: rendering and structural equality.

use std::collections::HashSet;

use crate::runtime::{
    gc::{GcHandle, GcHeap, HeapObject},
    reference::RefTarget,
    upvalue::UpValueState,
    value::{Member, Value},
};

/// Renders a value the way scripts print it.
pub fn render_value(heap: &GcHeap, value: &Value) -> String {
    let mut out = String::new();
    let mut active = Vec::new();
    render_into(heap, value, &mut out, &mut active);
    out
}

fn render_into(heap: &GcHeap, value: &Value, out: &mut String, active: &mut Vec<GcHandle>) {
    let Value::Object(handle) = value else {
        out.push_str(&value.to_string());
        return;
    };
    let Some(object) = heap.try_get(*handle) else {
        out.push_str("<freed>");
        return;
    };
    if active.contains(handle) {
        out.push_str(match object {
            HeapObject::Array(_) => "[...]",
            HeapObject::Dict(_) | HeapObject::Struct(_) => "{...}",
            _ => "...",
        });
        return;
    }

    active.push(*handle);
    match object {
        HeapObject::Str(s) => out.push_str(s),
        HeapObject::Array(elements) => {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_into(heap, element, out, active);
            }
            out.push(']');
        }
        HeapObject::Dict(entries) => {
            // Sorted so output does not depend on hash order.
            let mut rendered: Vec<String> = entries
                .iter()
                .map(|(k, v)| {
                    let mut pair = String::new();
                    render_into(heap, k, &mut pair, active);
                    pair.push(':');
                    render_into(heap, v, &mut pair, active);
                    pair
                })
                .collect();
            rendered.sort();
            out.push('{');
            out.push_str(&rendered.join(","));
            out.push('}');
        }
        HeapObject::Struct(fields) => {
            out.push('{');
            for (i, (name, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(name);
                out.push(':');
                render_into(heap, field, out, active);
            }
            out.push('}');
        }
        HeapObject::Function(function) => {
            out.push_str(&format!("<fn {}>", function.name));
        }
        HeapObject::Closure(closure) => {
            render_into(heap, &Value::Object(closure.function), out, active);
        }
        HeapObject::ClassClosureBind(bind) => {
            render_into(heap, &Value::Object(bind.closure), out, active);
        }
        HeapObject::UpValue(upvalue) => match upvalue.state {
            UpValueState::Closed(value) => render_into(heap, &value, out, active),
            UpValueState::Open(slot) => out.push_str(&format!("<upvalue slot {}>", slot)),
        },
        HeapObject::Native(native) => {
            out.push_str(&format!("<native fn {}>", native.name));
        }
        HeapObject::Ref(reference) => match reference.target {
            RefTarget::Stack(slot) => out.push_str(&format!("<ref slot {}>", slot)),
            RefTarget::Global(slot) => out.push_str(&format!("<ref global {}>", slot)),
            RefTarget::UpValue(upvalue) => {
                render_into(heap, &Value::Object(upvalue), out, active)
            }
            RefTarget::ArrayElement { array, index } => {
                let element = heap
                    .try_get(array)
                    .and_then(HeapObject::as_array)
                    .and_then(|elements| elements.get(index).copied())
                    .unwrap_or(Value::Nil);
                render_into(heap, &element, out, active);
            }
            RefTarget::DictEntry { dict, key } => {
                let entry = match heap.try_get(dict) {
                    Some(HeapObject::Dict(entries)) => {
                        entries.get(&key).copied().unwrap_or(Value::Nil)
                    }
                    _ => Value::Nil,
                };
                render_into(heap, &entry, out, active);
            }
        },
        HeapObject::Class(class) => {
            out.push_str("class ");
            out.push_str(&class.name);
            if !class.parents.is_empty() {
                out.push(':');
                let names: Vec<&str> = class.parents.iter().map(|(n, _)| n.as_str()).collect();
                out.push_str(&names.join(","));
            }
            out.push('{');
            let members = class
                .default_members
                .iter()
                .chain(class.functions.iter())
                .chain(class.enums.iter());
            render_members(heap, members, ":", out, active);
            out.push('}');
        }
        HeapObject::ClassInstance(instance) => {
            let name = heap
                .try_get(instance.class)
                .and_then(HeapObject::as_class)
                .map(|class| class.name.as_str())
                .unwrap_or("?");
            out.push_str(name);
            out.push_str(" instance{");
            render_members(heap, instance.members.iter(), ":", out, active);
            out.push('}');
        }
        HeapObject::Enum(enumeration) => {
            out.push_str("enum ");
            out.push_str(&enumeration.name);
            out.push('{');
            for (i, (name, case)) in enumeration.cases.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(name);
                out.push('=');
                render_into(heap, case, out, active);
            }
            out.push('}');
        }
        HeapObject::Module(module) => {
            out.push_str("module ");
            out.push_str(&module.name);
            out.push('{');
            render_members(heap, module.members.iter(), "=", out, active);
            out.push('}');
        }
    }
    active.pop();
}

fn render_members<'a>(
    heap: &GcHeap,
    members: impl Iterator<Item = (&'a String, &'a Member)>,
    separator: &str,
    out: &mut String,
    active: &mut Vec<GcHandle>,
) {
    for (i, (name, member)) in members.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(name);
        out.push_str(separator);
        render_into(heap, &member.value, out, active);
    }
}

/// Language-level `==`: numbers across kinds, objects structurally.
///
/// Objects of different kinds are never equal. Pairs already under
/// comparison are assumed equal, so cyclic graphs terminate.
pub fn values_equal(heap: &GcHeap, left: &Value, right: &Value) -> bool {
    let mut visiting = HashSet::new();
    equal_inner(heap, left, right, &mut visiting)
}

fn equal_inner(
    heap: &GcHeap,
    left: &Value,
    right: &Value,
    visiting: &mut HashSet<(GcHandle, GcHandle)>,
) -> bool {
    let (Value::Object(a), Value::Object(b)) = (left, right) else {
        return left == right;
    };
    if a == b {
        return true;
    }
    if !visiting.insert((*a, *b)) {
        return true;
    }
    let (Some(x), Some(y)) = (heap.try_get(*a), heap.try_get(*b)) else {
        return false;
    };

    let eq = |l: &Value, r: &Value, visiting: &mut HashSet<(GcHandle, GcHandle)>| {
        equal_inner(heap, l, r, visiting)
    };

    let result = match (x, y) {
        (HeapObject::Str(l), HeapObject::Str(r)) => l == r,
        (HeapObject::Array(l), HeapObject::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| eq(l, r, visiting))
        }
        (HeapObject::Dict(l), HeapObject::Dict(r)) => {
            l.len() == r.len()
                && l.iter().all(|(k1, v1)| {
                    r.iter()
                        .any(|(k2, v2)| eq(k1, k2, visiting) && eq(v1, v2, visiting))
                })
        }
        (HeapObject::Struct(l), HeapObject::Struct(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(name, v)| r.get(name).is_some_and(|w| eq(v, w, visiting)))
        }
        (HeapObject::Function(l), HeapObject::Function(r)) => {
            l.name == r.name
                && l.arity == r.arity
                && l.upvalue_count == r.upvalue_count
                && l.chunk.code == r.chunk.code
                && l.chunk.constants.len() == r.chunk.constants.len()
                && l.chunk
                    .constants
                    .iter()
                    .zip(&r.chunk.constants)
                    .all(|(l, r)| eq(l, r, visiting))
        }
        (HeapObject::Closure(l), HeapObject::Closure(r)) => {
            eq(&Value::Object(l.function), &Value::Object(r.function), visiting)
                && l.upvalues.len() == r.upvalues.len()
                && l.upvalues
                    .iter()
                    .zip(&r.upvalues)
                    .all(|(l, r)| eq(&Value::Object(*l), &Value::Object(*r), visiting))
        }
        (HeapObject::UpValue(l), HeapObject::UpValue(r)) => match (l.state, r.state) {
            (UpValueState::Closed(l), UpValueState::Closed(r)) => eq(&l, &r, visiting),
            (UpValueState::Open(l), UpValueState::Open(r)) => l == r,
            _ => false,
        },
        (HeapObject::Native(l), HeapObject::Native(r)) => l == r,
        (HeapObject::Ref(l), HeapObject::Ref(r)) => l.target == r.target,
        (HeapObject::Class(l), HeapObject::Class(r)) => {
            l.name == r.name
                && l.parents == r.parents
                && members_equal(heap, &l.default_members, &r.default_members, visiting)
                && members_equal(heap, &l.functions, &r.functions, visiting)
                && members_equal(heap, &l.enums, &r.enums, visiting)
        }
        (HeapObject::ClassInstance(l), HeapObject::ClassInstance(r)) => {
            l.class == r.class && members_equal(heap, &l.members, &r.members, visiting)
        }
        (HeapObject::ClassClosureBind(l), HeapObject::ClassClosureBind(r)) => {
            eq(&l.receiver, &r.receiver, visiting)
                && eq(&Value::Object(l.closure), &Value::Object(r.closure), visiting)
        }
        (HeapObject::Enum(l), HeapObject::Enum(r)) => {
            l.name == r.name
                && l.cases.len() == r.cases.len()
                && l.cases
                    .iter()
                    .all(|(name, v)| r.cases.get(name).is_some_and(|w| eq(v, w, visiting)))
        }
        (HeapObject::Module(l), HeapObject::Module(r)) => {
            l.name == r.name && members_equal(heap, &l.members, &r.members, visiting)
        }
        _ => false,
    };

    visiting.remove(&(*a, *b));
    result
}

fn members_equal(
    heap: &GcHeap,
    left: &std::collections::BTreeMap<String, Member>,
    right: &std::collections::BTreeMap<String, Member>,
    visiting: &mut HashSet<(GcHandle, GcHandle)>,
) -> bool {
    left.len() == right.len()
        && left.iter().all(|(name, l)| {
            right.get(name).is_some_and(|r| {
                l.permission == r.permission && equal_inner(heap, &l.value, &r.value, visiting)
            })
        })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn renders_nested_containers() {
        let mut heap = GcHeap::new();
        let s = heap.alloc(HeapObject::from("hi"));
        let inner = heap.alloc(HeapObject::Array(vec![Value::Int(1), Value::Real(2.5)]));
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), Value::Object(s));
        fields.insert("b".to_string(), Value::Object(inner));
        let st = heap.alloc(HeapObject::Struct(fields));
        let outer = heap.alloc(HeapObject::Array(vec![
            Value::Nil,
            Value::Bool(true),
            Value::Object(st),
        ]));

        assert_snapshot!(render_value(&heap, &Value::Object(outer)), @"[null,true,{a:hi,b:[1,2.5]}]");
    }

    #[test]
    fn renders_cycles_without_looping() {
        let mut heap = GcHeap::new();
        let array = heap.alloc(HeapObject::Array(Vec::new()));
        let mut entries = HashMap::new();
        entries.insert(Value::Int(1), Value::Object(array));
        let dict = heap.alloc(HeapObject::Dict(entries));
        if let HeapObject::Array(elements) = heap.get_mut(array) {
            elements.push(Value::Object(dict));
        }

        assert_snapshot!(render_value(&heap, &Value::Object(array)), @"[{1:[...]}]");
    }

    #[test]
    fn distinct_arrays_with_equal_contents_are_equal_but_distinct_keys() {
        let mut heap = GcHeap::new();
        let a = heap.alloc(HeapObject::Array(vec![Value::Int(1), Value::Int(2)]));
        let b = heap.alloc(HeapObject::Array(vec![Value::Int(1), Value::Real(2.0)]));

        assert!(values_equal(&heap, &Value::Object(a), &Value::Object(b)));
        assert_ne!(Value::Object(a), Value::Object(b));

        let mut dict = HashMap::new();
        dict.insert(Value::Object(a), Value::Int(1));
        assert!(!dict.contains_key(&Value::Object(b)));
    }

    #[test]
    fn kinds_must_match() {
        let mut heap = GcHeap::new();
        let s = heap.alloc(HeapObject::from("1"));
        let a = heap.alloc(HeapObject::Array(vec![Value::Int(1)]));
        assert!(!values_equal(&heap, &Value::Object(s), &Value::Object(a)));
        assert!(!values_equal(&heap, &Value::Object(s), &Value::Int(1)));
        assert!(values_equal(&heap, &Value::Int(1), &Value::Real(1.0)));
    }

    #[test]
    fn cyclic_structures_compare_without_looping() {
        let mut heap = GcHeap::new();
        let a = heap.alloc(HeapObject::Array(Vec::new()));
        let b = heap.alloc(HeapObject::Array(Vec::new()));
        if let HeapObject::Array(elements) = heap.get_mut(a) {
            elements.push(Value::Object(a));
        }
        if let HeapObject::Array(elements) = heap.get_mut(b) {
            elements.push(Value::Object(b));
        }
        assert!(values_equal(&heap, &Value::Object(a), &Value::Object(b)));
    }

    #[test]
    fn dicts_compare_by_entries() {
        let mut heap = GcHeap::new();
        let k1 = heap.alloc(HeapObject::from("k"));
        let k2 = heap.alloc(HeapObject::from("k"));
        let mut l = HashMap::new();
        l.insert(Value::Object(k1), Value::Int(1));
        let mut r = HashMap::new();
        r.insert(Value::Object(k2), Value::Real(1.0));
        let l = heap.alloc(HeapObject::Dict(l));
        let r = heap.alloc(HeapObject::Dict(r));
        assert!(values_equal(&heap, &Value::Object(l), &Value::Object(r)));
    }
}
