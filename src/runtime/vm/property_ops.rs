use crate::{
    error::RuntimeError,
    runtime::{
        class::{Class, ClassInstance},
        closure::ClassClosureBind,
        gc::{GcHandle, HeapObject},
        module::ModuleObject,
        value::{Member, Permission, Value},
    },
};

use super::VM;

/// Member counts carried by `OpClass`, in operand order.
#[derive(Debug, Clone, Copy)]
struct ClassLayout {
    constructors: usize,
    parents: usize,
    variables: usize,
    constants: usize,
    functions: usize,
    enums: usize,
}

impl From<[usize; 6]> for ClassLayout {
    fn from(counts: [usize; 6]) -> Self {
        let [constructors, parents, variables, constants, functions, enums] = counts;
        Self {
            constructors,
            parents,
            variables,
            constants,
            functions,
            enums,
        }
    }
}

impl ClassLayout {
    fn stack_len(&self) -> usize {
        1 + self.constructors
            + 2 * (self.parents + self.variables + self.constants + self.functions + self.enums)
    }
}

impl VM {
    /// Reads `count` (name, value) pairs starting `offset` slots below the
    /// top. Each name sits directly above its value.
    fn read_named_pairs(
        &self,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, Value)>, RuntimeError> {
        (0..count)
            .map(|i| {
                let at = offset + i * 2;
                Ok((self.name_operand(self.peek(at)?)?, self.peek(at + 1)?))
            })
            .collect()
    }

    /// Builds a class from the stack: name on top, then constructors,
    /// parents, variables, constants, functions and enums.
    pub(super) fn execute_class(&mut self, counts: [usize; 6]) -> Result<(), RuntimeError> {
        let layout = ClassLayout::from(counts);
        let mut class = Class::new(self.name_operand(self.peek(0)?)?);
        let mut offset = 1;

        for i in 0..layout.constructors {
            let constructor = self.peek(offset + i)?;
            let arity = constructor
                .as_handle()
                .and_then(|handle| self.heap.get(handle).as_closure())
                .and_then(|closure| self.heap.get(closure.function).as_function())
                .map(|function| function.arity)
                .ok_or_else(|| {
                    RuntimeError::invalid_bytecode(format!(
                        "constructor of {} is not a closure",
                        class.name
                    ))
                })?;
            if let Value::Object(handle) = constructor {
                class.constructors.insert(arity, handle);
            }
        }
        offset += layout.constructors;

        let mut parents = Vec::with_capacity(layout.parents);
        for (name, parent) in self.read_named_pairs(offset, layout.parents)? {
            match parent.as_handle() {
                Some(handle) if self.heap.get(handle).as_class().is_some() => {
                    parents.push((name, handle));
                }
                _ => {
                    return Err(RuntimeError::type_error(format!(
                        "parent {} of {} is not a class",
                        name, class.name
                    )));
                }
            }
        }
        // Topmost pair is the last declared parent.
        parents.reverse();
        class.parents = parents;
        offset += layout.parents * 2;

        for (name, value) in self.read_named_pairs(offset, layout.variables)? {
            class.default_members.insert(name, Member::mutable(value));
        }
        offset += layout.variables * 2;

        for (name, value) in self.read_named_pairs(offset, layout.constants)? {
            class.default_members.insert(name, Member::immutable(value));
        }
        offset += layout.constants * 2;

        for (name, value) in self.read_named_pairs(offset, layout.functions)? {
            class.functions.insert(name, Member::immutable(value));
        }
        offset += layout.functions * 2;

        for (name, value) in self.read_named_pairs(offset, layout.enums)? {
            class.enums.insert(name, Member::immutable(value));
        }

        log::debug!(
            "defined class {} with {} parents and {} constructors",
            class.name,
            class.parents.len(),
            class.constructors.len()
        );

        let handle = self.alloc(HeapObject::Class(class));
        self.drop_top(layout.stack_len())?;
        self.push(Value::Object(handle))
    }

    /// Replaces the class on top of the stack with a fresh instance.
    pub(super) fn execute_class_instance(&mut self) -> Result<(), RuntimeError> {
        let value = self.deref(self.peek(0)?);
        let instance = match value.as_handle().map(|handle| (handle, self.heap.get(handle))) {
            Some((handle, HeapObject::Class(class))) => ClassInstance::new(handle, class),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "cannot instantiate {}",
                    self.describe_kind(&value)
                )));
            }
        };
        let instance = self.alloc(HeapObject::ClassInstance(instance));
        self.pop()?;
        self.push(Value::Object(instance))
    }

    /// `receiver.name` with the name on top of the receiver.
    pub(super) fn execute_get_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.name_operand(self.peek(0)?)?;
        let receiver = self.deref(self.peek(1)?);
        let Value::Object(handle) = receiver else {
            return Err(self.no_properties_err(&name, &receiver));
        };

        let found = match self.heap.get(handle) {
            HeapObject::Class(class) => class.member(&self.heap, &name).map(|m| m.value),
            HeapObject::ClassInstance(instance) => {
                instance.member(&self.heap, &name).map(|m| m.value)
            }
            HeapObject::Enum(object) => object.cases.get(&name).copied(),
            HeapObject::Struct(fields) => fields.get(&name).copied(),
            HeapObject::Module(module) => module.members.get(&name).map(|m| m.value),
            _ => return Err(self.no_properties_err(&name, &receiver)),
        };
        let Some(value) = found else {
            return Err(RuntimeError::undefined_member(&name, &self.owner_name(handle)));
        };
        let value = self.bind_method(receiver, value);

        self.drop_top(2)?;
        self.push(value)
    }

    /// `receiver.name = value` with the stack laid out as
    /// `value, receiver, name`. The assigned value stays on the stack.
    pub(super) fn execute_set_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.pop()?;
        let name = self.name_operand(name)?;
        let receiver = self.pop()?;
        let receiver = self.deref(receiver);
        let value = self.peek(0)?;
        let Value::Object(handle) = receiver else {
            return Err(self.no_properties_err(&name, &receiver));
        };

        let existing = match self.heap.get(handle) {
            HeapObject::Class(class) => class.member(&self.heap, &name),
            HeapObject::ClassInstance(instance) => instance.member(&self.heap, &name),
            HeapObject::Module(module) => module.members.get(&name).copied(),
            HeapObject::Struct(fields) => fields.get(&name).map(|v| Member::mutable(*v)),
            HeapObject::Enum(_) => Some(Member::immutable(Value::Nil)),
            _ => return Err(self.no_properties_err(&name, &receiver)),
        };
        match existing {
            None => return Err(RuntimeError::undefined_member(&name, &self.owner_name(handle))),
            Some(member) if member.permission == Permission::Immutable => {
                return Err(RuntimeError::immutable(&name, &self.owner_name(handle)));
            }
            Some(_) => {}
        }

        match self.heap.get_mut(handle) {
            HeapObject::Class(class) => {
                class.default_members.insert(name, Member::mutable(value));
            }
            HeapObject::ClassInstance(instance) => {
                instance.members.insert(name, Member::mutable(value));
            }
            HeapObject::Module(module) => {
                module.members.insert(name, Member::mutable(value));
            }
            HeapObject::Struct(fields) => {
                fields.insert(name, value);
            }
            _ => {}
        }
        Ok(())
    }

    /// `super.name`: searches only the parents of the receiver's class.
    pub(super) fn execute_get_base(&mut self) -> Result<(), RuntimeError> {
        let name = self.name_operand(self.peek(0)?)?;
        let receiver = self.deref(self.peek(1)?);

        let class = match receiver.as_handle().map(|handle| (handle, self.heap.get(handle))) {
            Some((handle, HeapObject::Class(_))) => handle,
            Some((_, HeapObject::ClassInstance(instance))) => instance.class,
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "{} has no base class",
                    self.describe_kind(&receiver)
                )));
            }
        };

        let found = self
            .heap
            .get(class)
            .as_class()
            .and_then(|class| class.parent_member(&self.heap, &name));
        let Some(member) = found else {
            return Err(RuntimeError::undefined_member(
                &name,
                &format!("the parents of {}", self.owner_name(class)),
            ));
        };
        let value = self.bind_method(receiver, member.value);

        self.drop_top(2)?;
        self.push(value)
    }

    /// Builds a module: name on top, then constants, then variables.
    pub(super) fn execute_module(
        &mut self,
        var_count: usize,
        const_count: usize,
    ) -> Result<(), RuntimeError> {
        let mut module = ModuleObject::new(self.name_operand(self.peek(0)?)?);
        for (name, value) in self.read_named_pairs(1, const_count)? {
            module.members.insert(name, Member::immutable(value));
        }
        for (name, value) in self.read_named_pairs(1 + const_count * 2, var_count)? {
            module.members.insert(name, Member::mutable(value));
        }

        let handle = self.alloc(HeapObject::Module(module));
        self.drop_top(1 + (const_count + var_count) * 2)?;
        self.push(Value::Object(handle))
    }

    /// Closures read off a class or instance come back bound to it.
    fn bind_method(&mut self, receiver: Value, value: Value) -> Value {
        let receiver_is_class = receiver.as_handle().is_some_and(|handle| {
            matches!(
                self.heap.get(handle),
                HeapObject::Class(_) | HeapObject::ClassInstance(_)
            )
        });
        let closure = value
            .as_handle()
            .filter(|handle| matches!(self.heap.get(*handle), HeapObject::Closure(_)));

        match closure {
            Some(closure) if receiver_is_class => {
                let bind = self.alloc(HeapObject::ClassClosureBind(ClassClosureBind {
                    receiver,
                    closure,
                }));
                Value::Object(bind)
            }
            _ => value,
        }
    }

    fn owner_name(&self, handle: GcHandle) -> String {
        match self.heap.get(handle) {
            HeapObject::Class(class) => format!("class {}", class.name),
            HeapObject::ClassInstance(instance) => match self.heap.get(instance.class).as_class() {
                Some(class) => format!("{} instance", class.name),
                None => "instance".to_string(),
            },
            HeapObject::Enum(object) => format!("enum {}", object.name),
            HeapObject::Module(module) => format!("module {}", module.name),
            other => other.kind().to_string(),
        }
    }

    #[cold]
    #[inline(never)]
    fn no_properties_err(&self, name: &str, receiver: &Value) -> RuntimeError {
        RuntimeError::type_error(format!(
            "cannot access property '{}' of {}",
            name,
            self.describe_kind(receiver)
        ))
    }
}
