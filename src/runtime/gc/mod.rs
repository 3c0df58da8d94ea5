pub mod gc_handle;
pub mod gc_heap;
pub mod heap_entry;
pub mod heap_object;

pub use gc_handle::GcHandle;
pub use gc_heap::{GcHeap, GcStats};
pub use heap_object::{HeapObject, ObjectKind};
