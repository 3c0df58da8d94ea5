use crate::{
    config::DEFAULT_GC_THRESHOLD,
    runtime::{
        gc::{
            gc_handle::GcHandle,
            heap_entry::{HeapEntry, Slot},
            heap_object::HeapObject,
        },
        value::Value,
    },
};

const GC_HEAP_GROW_FACTOR: usize = 2;

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    pub total_allocations: usize,
    pub total_collections: usize,
    pub live_objects: usize,
    pub live_bytes: usize,
    pub next_gc: usize,
}

/// Stop-the-world mark-and-sweep heap.
///
/// Every object the runtime creates lives here and is addressed by a
/// [`GcHandle`]. `alloc` never collects; the owner decides when to call
/// [`GcHeap::collect`] (see [`GcHeap::should_collect`]) after marking its
/// roots with [`GcHeap::mark_value`] / [`GcHeap::mark_handle`].
pub struct GcHeap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    gray: Vec<GcHandle>,
    pinned: Vec<GcHandle>,
    bytes_allocated: usize,
    next_gc: usize,
    initial_threshold: usize,
    paused: usize,
    stress: bool,
    debug: bool,
    total_collections: usize,
    total_allocations: usize,
}

impl Default for GcHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl GcHeap {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_GC_THRESHOLD)
    }

    /// Creates a heap whose first collection triggers after `threshold`
    /// bytes. Later thresholds grow from the surviving live bytes but never
    /// drop below this one.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            gray: Vec::new(),
            pinned: Vec::new(),
            bytes_allocated: 0,
            next_gc: threshold,
            initial_threshold: threshold,
            paused: 0,
            stress: false,
            debug: false,
            total_collections: 0,
            total_allocations: 0,
        }
    }

    pub fn set_stress(&mut self, enabled: bool) {
        self.stress = enabled;
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    /// Suspends collection until a matching [`GcHeap::resume_gc`]. Nests.
    pub fn stop_gc(&mut self) {
        self.paused += 1;
    }

    pub fn resume_gc(&mut self) {
        self.paused = self.paused.saturating_sub(1);
    }

    pub fn is_paused(&self) -> bool {
        self.paused > 0
    }

    /// Returns `true` when a collection is due and not suspended.
    pub fn should_collect(&self) -> bool {
        self.paused == 0 && (self.stress || self.bytes_allocated > self.next_gc)
    }

    /// Allocates a new heap object and returns a handle to it.
    ///
    /// Freed slots are reused through the free list before growing storage.
    pub fn alloc(&mut self, object: HeapObject) -> GcHandle {
        self.total_allocations += 1;
        self.bytes_allocated += object.shallow_size_bytes();

        if self.debug {
            log::debug!("gc: allocate {} ({} bytes)", object.kind(), object.shallow_size_bytes());
        }

        let entry = HeapEntry {
            object,
            marked: false,
        };

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            GcHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            GcHandle::new(index, 0)
        }
    }

    fn entry(&self, handle: GcHandle) -> Option<&HeapEntry> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, handle: GcHandle) -> Option<&mut HeapEntry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub fn try_get(&self, handle: GcHandle) -> Option<&HeapObject> {
        self.entry(handle).map(|entry| &entry.object)
    }

    pub fn try_get_mut(&mut self, handle: GcHandle) -> Option<&mut HeapObject> {
        self.entry_mut(handle).map(|entry| &mut entry.object)
    }

    /// Returns a live object by handle.
    ///
    /// Panics if the handle is stale: reaching a freed object means the root
    /// set was incomplete, which is not recoverable.
    pub fn get(&self, handle: GcHandle) -> &HeapObject {
        match self.try_get(handle) {
            Some(object) => object,
            None => panic!("GcHeap::get: stale or invalid handle {}", handle),
        }
    }

    pub fn get_mut(&mut self, handle: GcHandle) -> &mut HeapObject {
        match self.try_get_mut(handle) {
            Some(object) => object,
            None => panic!("GcHeap::get_mut: stale or invalid handle {}", handle),
        }
    }

    pub fn is_live(&self, handle: GcHandle) -> bool {
        self.entry(handle).is_some()
    }

    /// Keeps `handle` alive across collections until [`GcHeap::unpin`].
    pub fn pin(&mut self, handle: GcHandle) {
        self.pinned.push(handle);
    }

    pub fn unpin(&mut self, handle: GcHandle) {
        if let Some(pos) = self.pinned.iter().rposition(|h| *h == handle) {
            self.pinned.swap_remove(pos);
        }
    }

    /// Returns the number of currently live heap entries.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            total_allocations: self.total_allocations,
            total_collections: self.total_collections,
            live_objects: self.live_count(),
            live_bytes: self.bytes_allocated,
            next_gc: self.next_gc,
        }
    }

    pub fn mark_value(&mut self, value: &Value) {
        if let Value::Object(handle) = value {
            self.mark_handle(*handle);
        }
    }

    pub fn mark_values(&mut self, values: &[Value]) {
        for value in values {
            self.mark_value(value);
        }
    }

    /// Marks `handle` gray. A no-op for marked or stale handles, so marking
    /// never recurses and terminates on cycles.
    pub fn mark_handle(&mut self, handle: GcHandle) {
        let debug = self.debug;
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        if entry.marked {
            return;
        }
        entry.marked = true;
        if debug {
            log::debug!("gc: mark {} {}", handle, entry.object.kind());
        }
        self.gray.push(handle);
    }

    /// Runs a full collection.
    ///
    /// The caller must have marked its roots first; pinned handles are
    /// marked here. Returns the number of objects freed.
    pub fn collect(&mut self) -> usize {
        if self.debug {
            log::debug!("gc: begin, {} bytes allocated", self.bytes_allocated);
        }

        let pinned = std::mem::take(&mut self.pinned);
        for handle in &pinned {
            self.mark_handle(*handle);
        }
        self.pinned = pinned;

        self.trace_references();
        let freed = self.sweep();

        self.total_collections += 1;
        self.next_gc = (self.bytes_allocated * GC_HEAP_GROW_FACTOR).max(self.initial_threshold);

        if self.debug {
            log::debug!(
                "gc: end, freed {} objects, {} bytes live, next at {}",
                freed,
                self.bytes_allocated,
                self.next_gc
            );
        }

        freed
    }

    /// Convenience for callers whose whole root set is a slice of values.
    pub fn collect_with_roots(&mut self, roots: &[Value]) -> usize {
        self.mark_values(roots);
        self.collect()
    }

    fn trace_references(&mut self) {
        let mut children = Vec::with_capacity(16);
        while let Some(handle) = self.gray.pop() {
            children.clear();
            if let Some(entry) = self.entry(handle) {
                if self.debug {
                    log::debug!("gc: blacken {} {}", handle, entry.object.kind());
                }
                entry.object.trace(&mut children);
            }
            for child in &children {
                self.mark_handle(*child);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        let mut live_bytes = 0;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if entry.marked {
                entry.marked = false;
                live_bytes += entry.object.shallow_size_bytes();
            } else {
                if self.debug {
                    log::debug!("gc: free #{}.{} {}", index, slot.generation, entry.object.kind());
                }
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                freed += 1;
            }
        }

        self.bytes_allocated = live_bytes;
        freed
    }
}
