use crate::runtime::{gc::GcHandle, value::Value};

/// Storage cell a [`Reference`] aliases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefTarget {
    /// Absolute stack slot. Only meaningful while the owning frame is live.
    Stack(usize),
    Global(usize),
    UpValue(GcHandle),
    ArrayElement { array: GcHandle, index: usize },
    DictEntry { dict: GcHandle, key: Value },
}

/// First-class alias to a storage cell, used for pass-by-reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    pub target: RefTarget,
}

impl Reference {
    pub fn new(target: RefTarget) -> Self {
        Self { target }
    }
}
