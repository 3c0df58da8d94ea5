use crate::runtime::gc::heap_object::HeapObject;

pub struct HeapEntry {
    pub(super) object: HeapObject,
    pub(super) marked: bool,
}

/// One heap slot. `generation` survives frees so stale handles are detected.
pub(super) struct Slot {
    pub(super) generation: u32,
    pub(super) entry: Option<HeapEntry>,
}
