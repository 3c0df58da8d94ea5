use std::fmt;

/// Handle into the GC heap.
///
/// A `GcHandle` is a copyable slot index plus the generation of the slot at
/// allocation time. A slot's generation is bumped every time it is freed, so
/// a handle that outlived its object no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl GcHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the raw heap slot index backing this handle.
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for GcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}
