use crate::{
    error::{ErrorKind, RuntimeError},
    runtime::{
        gc::{GcHandle, HeapObject},
        reference::{RefTarget, Reference},
        value::Value,
    },
};

use super::VM;

/// Maps a possibly negative index onto `0..len`.
pub(super) fn normalize_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Int(raw) = *index else {
        return Err(RuntimeError::invalid_index(format!(
            "index must be an int, got {}",
            index.type_name()
        )));
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RuntimeError::index_out_of_range(raw, len));
    }
    Ok(resolved as usize)
}

impl VM {
    /// `container[index]`: both operands stay on the stack until the result
    /// is ready.
    pub(super) fn execute_get_index(&mut self) -> Result<(), RuntimeError> {
        let index = self.deref(self.peek(0)?);
        let container = self.deref(self.peek(1)?);

        let Value::Object(handle) = container else {
            return Err(self.not_indexable_err(&container));
        };

        let result = match self.heap.get(handle) {
            HeapObject::Array(elements) => elements[normalize_index(&index, elements.len())?],
            HeapObject::Dict(entries) => match entries.get(&index) {
                Some(value) => *value,
                None => {
                    return Err(RuntimeError::new(
                        ErrorKind::MissingKey,
                        format!("key {} not found in dict", self.render(&index)),
                    ));
                }
            },
            HeapObject::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let ch = chars[normalize_index(&index, chars.len())?];
                Value::Object(self.alloc(HeapObject::Str(ch.to_string())))
            }
            _ => return Err(self.not_indexable_err(&container)),
        };

        self.drop_top(2)?;
        self.push(result)
    }

    /// `container[index] = value`, with the stack laid out as
    /// `value, container, index`. The assigned value stays on the stack.
    pub(super) fn execute_set_index(&mut self) -> Result<(), RuntimeError> {
        let index = self.pop()?;
        let index = self.deref(index);
        let container = self.pop()?;
        let container = self.deref(container);
        let value = self.peek(0)?;

        let Value::Object(handle) = container else {
            return Err(self.not_indexable_err(&container));
        };

        let replacement = match self.heap.get(handle) {
            HeapObject::Str(_) => {
                let stored = self.deref(value);
                match self.string_value(stored) {
                    Some(text) => Some(text.to_string()),
                    None => {
                        return Err(RuntimeError::type_error(format!(
                            "cannot store {} into a string",
                            self.describe_kind(&stored)
                        )));
                    }
                }
            }
            _ => None,
        };

        match self.heap.get_mut(handle) {
            HeapObject::Array(elements) => {
                let slot = normalize_index(&index, elements.len())?;
                elements[slot] = value;
            }
            HeapObject::Dict(entries) => {
                entries.insert(index, value);
            }
            HeapObject::Str(s) => {
                let mut chars: Vec<char> = s.chars().collect();
                let slot = normalize_index(&index, chars.len())?;
                let replacement = replacement.unwrap_or_default();
                chars.splice(slot..=slot, replacement.chars());
                *s = chars.into_iter().collect();
            }
            _ => return Err(self.not_indexable_err(&container)),
        }
        Ok(())
    }

    /// Pops an index and pushes a Reference to `container[index]`.
    ///
    /// A dict gains a `nil` entry for an absent key so the reference has a
    /// slot to alias.
    pub(super) fn push_index_reference(&mut self, container: Value) -> Result<(), RuntimeError> {
        let index = self.pop()?;
        let index = self.deref(index);
        let container = self.deref(container);

        let target = match container {
            Value::Object(handle) => self.index_target(handle, index)?,
            _ => None,
        };
        let Some(target) = target else {
            return Err(RuntimeError::invalid_index(format!(
                "cannot reference an index of {}",
                self.describe_kind(&container)
            )));
        };

        let reference = self.alloc(HeapObject::Ref(Reference::new(target)));
        self.push(Value::Object(reference))
    }

    fn index_target(
        &mut self,
        handle: GcHandle,
        index: Value,
    ) -> Result<Option<RefTarget>, RuntimeError> {
        let target = match self.heap.get_mut(handle) {
            HeapObject::Dict(entries) => {
                entries.entry(index).or_insert(Value::Nil);
                Some(RefTarget::DictEntry {
                    dict: handle,
                    key: index,
                })
            }
            HeapObject::Array(elements) => Some(RefTarget::ArrayElement {
                array: handle,
                index: normalize_index(&index, elements.len())?,
            }),
            _ => None,
        };
        Ok(target)
    }

    #[cold]
    #[inline(never)]
    fn not_indexable_err(&self, container: &Value) -> RuntimeError {
        RuntimeError::invalid_index(format!(
            "cannot index {}",
            self.describe_kind(container)
        ))
    }
}
