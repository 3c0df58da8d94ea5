use serde::{Deserialize, Serialize};

pub const DEFAULT_STACK_MAX: usize = 1024;
pub const DEFAULT_FRAMES_MAX: usize = 256;
pub const DEFAULT_GLOBALS_MAX: usize = 512;
pub const DEFAULT_GC_THRESHOLD: usize = 1024 * 1024;

/// Knobs consulted by the VM and its heap.
///
/// Passed by value to [`crate::VM::new`]; nothing here is global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Memoize closure results keyed by the hash of their arguments.
    pub use_function_cache: bool,
    /// Log mark, blacken and sweep events at debug level.
    pub debug_gc: bool,
    /// Collect before every VM allocation.
    pub stress_gc: bool,
    /// Log every executed instruction at trace level.
    pub trace_execution: bool,
    pub stack_max: usize,
    pub frames_max: usize,
    pub globals_max: usize,
    /// Heap size in bytes that triggers the first collection.
    pub initial_gc_threshold: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            use_function_cache: false,
            debug_gc: false,
            stress_gc: false,
            trace_execution: false,
            stack_max: DEFAULT_STACK_MAX,
            frames_max: DEFAULT_FRAMES_MAX,
            globals_max: DEFAULT_GLOBALS_MAX,
            initial_gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }
}

impl VmConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_function_cache(mut self, enabled: bool) -> Self {
        self.use_function_cache = enabled;
        self
    }

    pub fn with_stress_gc(mut self, enabled: bool) -> Self {
        self.stress_gc = enabled;
        self
    }

    pub fn with_debug_gc(mut self, enabled: bool) -> Self {
        self.debug_gc = enabled;
        self
    }

    pub fn with_trace_execution(mut self, enabled: bool) -> Self {
        self.trace_execution = enabled;
        self
    }
}
