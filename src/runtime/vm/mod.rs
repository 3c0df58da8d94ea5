use std::rc::Rc;

use crate::{
    config::VmConfig,
    error::{ErrorKind, RuntimeError},
    runtime::{
        closure::Closure,
        frame::Frame,
        gc::{GcHandle, GcHeap, GcStats, HeapObject},
        native_function::NativeFunction,
        object::{render_value, values_equal},
        reference::RefTarget,
        upvalue::{UpValue, UpValueState},
        value::Value,
    },
};

mod binary_ops;
mod comparison_ops;
mod dispatch;
mod function_call;
mod index_ops;
mod property_ops;
mod trace;

/// Stack-based bytecode interpreter.
///
/// A VM owns its heap, a fixed-capacity value stack, the call frames, the
/// global table and the chain of open upvalues. Globals survive between
/// calls to [`VM::run`]; the stack and frames are reset by each run.
pub struct VM {
    config: VmConfig,
    heap: GcHeap,
    stack: Vec<Value>,
    sp: usize,
    frames: Vec<Frame>,
    globals: Vec<Value>,
    open_upvalues: Option<GcHandle>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl VM {
    pub fn new(config: VmConfig) -> Self {
        let mut heap = GcHeap::with_threshold(config.initial_gc_threshold);
        heap.set_stress(config.stress_gc);
        heap.set_debug(config.debug_gc);

        Self {
            stack: vec![Value::Nil; config.stack_max],
            sp: 0,
            frames: Vec::with_capacity(config.frames_max.min(64)),
            globals: vec![Value::Nil; config.globals_max],
            open_upvalues: None,
            heap,
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &GcHeap {
        &self.heap
    }

    /// Direct heap access. Allocations made through the heap never collect,
    /// which makes it the right place to build entry functions and constants
    /// before a run.
    pub fn heap_mut(&mut self) -> &mut GcHeap {
        &mut self.heap
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    pub fn global(&self, index: usize) -> Option<Value> {
        self.globals.get(index).copied()
    }

    pub fn set_global(&mut self, index: usize, value: Value) -> Result<(), RuntimeError> {
        match self.globals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::invalid_bytecode(format!(
                "global slot {} exceeds table size {}",
                index,
                self.globals.len()
            ))),
        }
    }

    /// Registers a native function in global slot `index`.
    pub fn define_native(
        &mut self,
        index: usize,
        native: NativeFunction,
    ) -> Result<Value, RuntimeError> {
        let handle = self.heap.alloc(HeapObject::Native(native));
        let value = Value::Object(handle);
        self.set_global(index, value)?;
        Ok(value)
    }

    pub fn render(&self, value: &Value) -> String {
        render_value(&self.heap, value)
    }

    pub fn values_equal(&self, left: &Value, right: &Value) -> bool {
        values_equal(&self.heap, left, right)
    }

    /// Runs `entry` (a function object) to completion and returns the values
    /// it returned, in order. A function that returns nothing yields `[nil]`.
    pub fn run(&mut self, entry: GcHandle) -> Result<Vec<Value>, RuntimeError> {
        self.reset();

        let chunk = match self.heap.try_get(entry) {
            Some(HeapObject::Function(function)) => Rc::clone(&function.chunk),
            _ => {
                return Err(RuntimeError::invalid_bytecode(
                    "entry point is not a function",
                ));
            }
        };

        // The pending closure roots `entry` if this allocation collects.
        let closure = self.alloc(HeapObject::Closure(Closure::new(entry, Vec::new())));

        self.push(Value::Object(closure))?;
        self.frames.push(Frame::new(closure, chunk, 0));

        match self.execute() {
            Ok(()) => {
                let results = self.stack[..self.sp].to_vec();
                self.sp = 0;
                Ok(results)
            }
            Err(err) => {
                let err = self.decorate_error(err);
                self.reset();
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.sp = 0;
        self.frames.clear();
        self.open_upvalues = None;
    }

    /// Allocates through the collector: collects first when the heap is due.
    ///
    /// Handles held by `object` are treated as roots for that collection.
    /// Anything else the caller holds must already be reachable from the
    /// stack, frames, globals or pins.
    pub fn alloc(&mut self, object: HeapObject) -> GcHandle {
        if self.heap.should_collect() {
            let mut pending = Vec::new();
            object.trace(&mut pending);
            self.collect_garbage_with(&pending);
        }
        self.heap.alloc(object)
    }

    pub fn alloc_string(&mut self, s: impl Into<String>) -> Value {
        Value::Object(self.alloc(HeapObject::Str(s.into())))
    }

    /// Collects now, using the VM's roots. Returns the number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.collect_garbage_with(&[])
    }

    fn collect_garbage_with(&mut self, extra_roots: &[GcHandle]) -> usize {
        self.heap.mark_values(&self.stack[..self.sp]);
        for frame in &self.frames {
            self.heap.mark_handle(frame.closure);
        }
        self.heap.mark_values(&self.globals);

        let mut cursor = self.open_upvalues;
        while let Some(handle) = cursor {
            self.heap.mark_handle(handle);
            cursor = self
                .heap
                .try_get(handle)
                .and_then(HeapObject::as_upvalue)
                .and_then(|upvalue| upvalue.next);
        }

        for handle in extra_roots {
            self.heap.mark_handle(*handle);
        }

        self.heap.collect()
    }

    #[inline(always)]
    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= self.stack.len() {
            return Err(RuntimeError::new(
                ErrorKind::StackOverflow,
                format!("value stack exceeded {} slots", self.stack.len()),
            ));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    #[inline(always)]
    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::stack_underflow());
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    #[inline(always)]
    fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        if distance >= self.sp {
            return Err(RuntimeError::stack_underflow());
        }
        Ok(self.stack[self.sp - 1 - distance])
    }

    fn drop_top(&mut self, count: usize) -> Result<(), RuntimeError> {
        if count > self.sp {
            return Err(RuntimeError::stack_underflow());
        }
        self.sp -= count;
        Ok(())
    }

    fn current_frame(&self) -> Result<&Frame, RuntimeError> {
        self.frames
            .last()
            .ok_or_else(|| RuntimeError::invalid_bytecode("no active call frame"))
    }

    fn current_frame_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::invalid_bytecode("no active call frame"))
    }

    fn local_slot(&self, index: usize) -> Result<usize, RuntimeError> {
        let slot = self.current_frame()?.base_pointer + index;
        if slot >= self.stack.len() {
            return Err(RuntimeError::invalid_bytecode(format!(
                "local slot {} outside the stack",
                index
            )));
        }
        Ok(slot)
    }

    fn global_slot(&self, index: usize) -> Result<usize, RuntimeError> {
        if index >= self.globals.len() {
            return Err(RuntimeError::invalid_bytecode(format!(
                "global slot {} exceeds table size {}",
                index,
                self.globals.len()
            )));
        }
        Ok(index)
    }

    /// The upvalue handle at `index` of the running closure.
    fn frame_upvalue(&self, index: usize) -> Result<GcHandle, RuntimeError> {
        let closure = self.current_frame()?.closure;
        self.heap
            .get(closure)
            .as_closure()
            .and_then(|closure| closure.upvalues.get(index).copied())
            .ok_or_else(|| {
                RuntimeError::invalid_bytecode(format!("upvalue {} not captured", index))
            })
    }

    fn read_upvalue(&self, handle: GcHandle) -> Value {
        match self.heap.get(handle).as_upvalue().map(|u| u.state) {
            Some(UpValueState::Open(slot)) => self.stack[slot],
            Some(UpValueState::Closed(value)) => value,
            None => Value::Nil,
        }
    }

    fn write_upvalue(&mut self, handle: GcHandle, value: Value) {
        let open_slot = match self.heap.get_mut(handle).as_upvalue_mut() {
            Some(upvalue) => match &mut upvalue.state {
                UpValueState::Open(slot) => Some(*slot),
                UpValueState::Closed(stored) => {
                    *stored = value;
                    None
                }
            },
            None => None,
        };
        if let Some(slot) = open_slot {
            self.stack[slot] = value;
        }
    }

    /// Finds or creates the open upvalue for absolute stack `slot`.
    ///
    /// The chain is ordered by descending slot, so closures capturing the
    /// same variable share one upvalue.
    fn capture_upvalue(&mut self, slot: usize) -> GcHandle {
        let mut previous: Option<GcHandle> = None;
        let mut cursor = self.open_upvalues;

        while let Some(handle) = cursor {
            let Some(upvalue) = self.heap.get(handle).as_upvalue() else {
                break;
            };
            match upvalue.open_slot() {
                Some(open) if open > slot => {
                    previous = Some(handle);
                    cursor = upvalue.next;
                }
                Some(open) if open == slot => return handle,
                _ => break,
            }
        }

        let created = self.alloc(HeapObject::UpValue(UpValue::open(slot, cursor)));
        match previous {
            None => self.open_upvalues = Some(created),
            Some(previous) => {
                if let Some(upvalue) = self.heap.get_mut(previous).as_upvalue_mut() {
                    upvalue.next = Some(created);
                }
            }
        }
        created
    }

    /// Closes every open upvalue at or above stack slot `last`.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(handle) = self.open_upvalues {
            let value_slot = match self.heap.get(handle).as_upvalue() {
                Some(upvalue) => match upvalue.open_slot() {
                    Some(slot) if slot >= last => slot,
                    _ => break,
                },
                None => break,
            };
            let value = self.stack[value_slot];
            if let Some(upvalue) = self.heap.get_mut(handle).as_upvalue_mut() {
                self.open_upvalues = upvalue.next;
                upvalue.close(value);
            }
        }
    }

    /// Follows a Reference to the value it aliases; other values pass
    /// through unchanged.
    fn deref(&self, value: Value) -> Value {
        let Value::Object(handle) = value else {
            return value;
        };
        match self.heap.get(handle) {
            HeapObject::Ref(reference) => self.read_target(&reference.target),
            _ => value,
        }
    }

    fn reference_target(&self, value: Value) -> Option<RefTarget> {
        let handle = value.as_handle()?;
        self.heap
            .get(handle)
            .as_reference()
            .map(|reference| reference.target)
    }

    fn read_target(&self, target: &RefTarget) -> Value {
        match *target {
            RefTarget::Stack(slot) => self.stack.get(slot).copied().unwrap_or(Value::Nil),
            RefTarget::Global(index) => self.globals.get(index).copied().unwrap_or(Value::Nil),
            RefTarget::UpValue(upvalue) => self.read_upvalue(upvalue),
            RefTarget::ArrayElement { array, index } => self
                .heap
                .get(array)
                .as_array()
                .and_then(|elements| elements.get(index).copied())
                .unwrap_or(Value::Nil),
            RefTarget::DictEntry { dict, key } => match self.heap.get(dict) {
                HeapObject::Dict(entries) => entries.get(&key).copied().unwrap_or(Value::Nil),
                _ => Value::Nil,
            },
        }
    }

    fn write_target(&mut self, target: RefTarget, value: Value) -> Result<(), RuntimeError> {
        match target {
            RefTarget::Stack(slot) => match self.stack.get_mut(slot) {
                Some(cell) => *cell = value,
                None => {
                    return Err(RuntimeError::invalid_index(
                        "reference to a stack slot outside the stack",
                    ));
                }
            },
            RefTarget::Global(index) => {
                let index = self.global_slot(index)?;
                self.globals[index] = value;
            }
            RefTarget::UpValue(upvalue) => self.write_upvalue(upvalue, value),
            RefTarget::ArrayElement { array, index } => match self.heap.get_mut(array) {
                HeapObject::Array(elements) => match elements.get_mut(index) {
                    Some(cell) => *cell = value,
                    None => {
                        return Err(RuntimeError::index_out_of_range(
                            index as i64,
                            elements.len(),
                        ));
                    }
                },
                _ => return Err(RuntimeError::type_error("reference target is not an array")),
            },
            RefTarget::DictEntry { dict, key } => match self.heap.get_mut(dict) {
                HeapObject::Dict(entries) => {
                    entries.insert(key, value);
                }
                _ => return Err(RuntimeError::type_error("reference target is not a dict")),
            },
        }
        Ok(())
    }

    /// Stores `value` into a variable cell, writing through the cell's
    /// current value instead when that is a Reference.
    fn assign_through(&mut self, current: Value, value: Value) -> Result<bool, RuntimeError> {
        match self.reference_target(current) {
            Some(target) => {
                self.write_target(target, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn string_value(&self, value: Value) -> Option<&str> {
        value
            .as_handle()
            .and_then(|handle| self.heap.get(handle).as_str())
    }

    /// Reads a member name operand placed on the stack by the front-end.
    fn name_operand(&self, value: Value) -> Result<String, RuntimeError> {
        self.string_value(value)
            .map(str::to_string)
            .ok_or_else(|| {
                RuntimeError::invalid_bytecode(format!(
                    "expected a name string, found {}",
                    self.render(&value)
                ))
            })
    }

    fn build_array(&mut self, count: usize) -> Result<Value, RuntimeError> {
        if count > self.sp {
            return Err(RuntimeError::stack_underflow());
        }
        let elements = self.stack[self.sp - count..self.sp].to_vec();
        let array = self.alloc(HeapObject::Array(elements));
        self.sp -= count;
        Ok(Value::Object(array))
    }

    fn build_dict(&mut self, count: usize) -> Result<Value, RuntimeError> {
        let len = count * 2;
        if len > self.sp {
            return Err(RuntimeError::stack_underflow());
        }
        let start = self.sp - len;
        let entries = self.stack[start..self.sp]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        let dict = self.alloc(HeapObject::Dict(entries));
        self.sp = start;
        Ok(Value::Object(dict))
    }

    /// Struct fields are laid out as (value, name) pairs with the name on
    /// top of its value.
    fn build_struct(&mut self, count: usize) -> Result<Value, RuntimeError> {
        let mut fields = std::collections::BTreeMap::new();
        for i in 0..count {
            let name = self.name_operand(self.peek(i * 2)?)?;
            let value = self.peek(i * 2 + 1)?;
            fields.insert(name, value);
        }
        let object = self.alloc(HeapObject::Struct(fields));
        self.drop_top(count * 2)?;
        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod binary_ops_test;
#[cfg(test)]
mod function_call_test;
