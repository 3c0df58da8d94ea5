use std::{collections::HashMap, rc::Rc};

use crate::{bytecode::chunk::Chunk, runtime::value::Value};

/// How a function binds arguments past its fixed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarArg {
    #[default]
    None,
    /// Extra arguments are accepted and dropped.
    TrailingUnnamed,
    /// Extra arguments are collected into an array bound to the last parameter.
    TrailingNamed,
}

/// A compiled function: code plus calling convention.
///
/// For variadic functions `arity` counts the trailing parameter.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub chunk: Rc<Chunk>,
    pub arity: usize,
    pub upvalue_count: usize,
    pub var_arg: VarArg,
    /// Return values keyed by the hash of the argument list.
    pub cache: HashMap<u64, Vec<Value>>,
}

impl Function {
    pub fn new(name: impl Into<String>, chunk: Chunk, arity: usize) -> Self {
        Self {
            name: name.into(),
            chunk: Rc::new(chunk),
            arity,
            upvalue_count: 0,
            var_arg: VarArg::None,
            cache: HashMap::new(),
        }
    }

    pub fn with_upvalues(mut self, upvalue_count: usize) -> Self {
        self.upvalue_count = upvalue_count;
        self
    }

    pub fn with_var_arg(mut self, var_arg: VarArg) -> Self {
        self.var_arg = var_arg;
        self
    }

    pub fn is_variadic(&self) -> bool {
        self.var_arg != VarArg::None
    }

    pub fn cached(&self, args_hash: u64) -> Option<&[Value]> {
        self.cache.get(&args_hash).map(Vec::as_slice)
    }

    pub fn store_cache(&mut self, args_hash: u64, results: Vec<Value>) {
        self.cache.insert(args_hash, results);
    }
}
