use std::collections::BTreeMap;

use crate::runtime::{
    gc::{GcHandle, GcHeap},
    value::{Member, Value},
};

/// A class: member tables, named parents and constructors by arity.
///
/// `parents` keeps declaration order, which is also the lookup order.
#[derive(Debug, Clone, Default)]
pub struct Class {
    pub name: String,
    pub parents: Vec<(String, GcHandle)>,
    pub default_members: BTreeMap<String, Member>,
    pub functions: BTreeMap<String, Member>,
    pub enums: BTreeMap<String, Member>,
    pub constructors: BTreeMap<usize, GcHandle>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn own_member(&self, name: &str) -> Option<Member> {
        self.default_members
            .get(name)
            .or_else(|| self.functions.get(name))
            .or_else(|| self.enums.get(name))
            .copied()
    }

    /// Own members first, then each parent in declaration order.
    pub fn member(&self, heap: &GcHeap, name: &str) -> Option<Member> {
        self.own_member(name)
            .or_else(|| self.parent_member(heap, name))
    }

    /// Searches the parents only. A parent's own name resolves to the parent
    /// class itself.
    pub fn parent_member(&self, heap: &GcHeap, name: &str) -> Option<Member> {
        for (parent_name, parent) in &self.parents {
            if parent_name == name {
                return Some(Member::immutable(Value::Object(*parent)));
            }
            let found = heap
                .get(*parent)
                .as_class()
                .and_then(|class| class.member(heap, name));
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// An object of a class with its own copy of the default members.
#[derive(Debug, Clone)]
pub struct ClassInstance {
    pub class: GcHandle,
    pub members: BTreeMap<String, Member>,
}

impl ClassInstance {
    pub fn new(class_handle: GcHandle, class: &Class) -> Self {
        Self {
            class: class_handle,
            members: class.default_members.clone(),
        }
    }

    pub fn member(&self, heap: &GcHeap, name: &str) -> Option<Member> {
        if let Some(member) = self.members.get(name) {
            return Some(*member);
        }
        heap.get(self.class)
            .as_class()
            .and_then(|class| class.member(heap, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::gc::HeapObject;

    fn class_with(heap: &mut GcHeap, name: &str, members: &[(&str, i64)]) -> GcHandle {
        let mut class = Class::new(name);
        for (member, value) in members {
            class
                .default_members
                .insert(member.to_string(), Member::mutable(Value::Int(*value)));
        }
        heap.alloc(HeapObject::Class(class))
    }

    #[test]
    fn second_parent_supplies_missing_member() {
        let mut heap = GcHeap::new();
        let a = class_with(&mut heap, "A", &[("y", 1)]);
        let b = class_with(&mut heap, "B", &[("x", 2)]);
        let mut child = Class::new("C");
        child.parents = vec![("A".into(), a), ("B".into(), b)];

        assert_eq!(child.member(&heap, "x").map(|m| m.value), Some(Value::Int(2)));
        assert_eq!(child.member(&heap, "y").map(|m| m.value), Some(Value::Int(1)));
        assert!(child.member(&heap, "z").is_none());
    }

    #[test]
    fn first_declared_parent_wins() {
        let mut heap = GcHeap::new();
        let a = class_with(&mut heap, "A", &[("x", 1)]);
        let b = class_with(&mut heap, "B", &[("x", 2)]);
        let mut child = Class::new("C");
        child.parents = vec![("A".into(), a), ("B".into(), b)];

        assert_eq!(child.member(&heap, "x").map(|m| m.value), Some(Value::Int(1)));
    }

    #[test]
    fn parent_member_skips_own_and_resolves_parent_name() {
        let mut heap = GcHeap::new();
        let a = class_with(&mut heap, "A", &[("x", 1)]);
        let mut child = Class::new("C");
        child.parents = vec![("A".into(), a)];
        child
            .default_members
            .insert("x".into(), Member::mutable(Value::Int(9)));

        assert_eq!(child.member(&heap, "x").map(|m| m.value), Some(Value::Int(9)));
        assert_eq!(child.parent_member(&heap, "x").map(|m| m.value), Some(Value::Int(1)));
        assert_eq!(
            child.parent_member(&heap, "A").map(|m| m.value),
            Some(Value::Object(a))
        );
    }

    #[test]
    fn instance_members_shadow_class() {
        let mut heap = GcHeap::new();
        let handle = class_with(&mut heap, "P", &[("x", 1)]);
        let class = heap.get(handle).as_class().unwrap().clone();
        let mut instance = ClassInstance::new(handle, &class);
        instance
            .members
            .insert("x".into(), Member::mutable(Value::Int(5)));

        assert_eq!(instance.member(&heap, "x").map(|m| m.value), Some(Value::Int(5)));
        assert_eq!(class.member(&heap, "x").map(|m| m.value), Some(Value::Int(1)));
    }
}
