use crate::runtime::{gc::GcHandle, value::Value};

/// A function together with the upvalues it captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: GcHandle,
    pub upvalues: Vec<GcHandle>,
}

impl Closure {
    pub fn new(function: GcHandle, upvalues: Vec<GcHandle>) -> Self {
        Self { function, upvalues }
    }
}

/// A method fetched off a class or instance, with its receiver bound.
///
/// Calling it places `receiver` in the callee slot, which the method sees as
/// local 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassClosureBind {
    pub receiver: Value,
    pub closure: GcHandle,
}
