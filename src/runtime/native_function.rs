use std::{fmt, rc::Rc};

use crate::{
    bytecode::token::Token,
    error::RuntimeError,
    runtime::{gc::GcHeap, value::Value},
};

/// Host callback: receives the heap, the argument window and the call-site
/// token. `Ok(None)` means the call produced no value; the VM pushes nil.
pub type NativeFn = dyn Fn(&mut GcHeap, &[Value], &Token) -> Result<Option<Value>, RuntimeError>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut GcHeap, &[Value], &Token) -> Result<Option<Value>, RuntimeError> + 'static,
    {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
