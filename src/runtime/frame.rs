use std::rc::Rc;

use crate::{bytecode::chunk::Chunk, runtime::gc::GcHandle};

#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: GcHandle,
    /// Shared with the closure's function so the heap can be mutated while
    /// the frame executes.
    pub chunk: Rc<Chunk>,
    pub ip: usize,
    /// Stack slot of the callee; locals start here (slot 0 is the receiver).
    pub base_pointer: usize,
    /// Argument-list hash for the function cache; `None` for the entry frame.
    pub args_hash: Option<u64>,
}

impl Frame {
    pub fn new(closure: GcHandle, chunk: Rc<Chunk>, base_pointer: usize) -> Self {
        Self {
            closure,
            chunk,
            ip: 0,
            base_pointer,
            args_hash: None,
        }
    }

    pub fn instructions(&self) -> &[u8] {
        &self.chunk.code
    }
}
