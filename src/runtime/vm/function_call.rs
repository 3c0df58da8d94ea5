use std::rc::Rc;

use crate::{
    bytecode::token::Token,
    error::{ErrorKind, RuntimeError},
    runtime::{
        class::ClassInstance,
        closure::Closure,
        frame::Frame,
        function::VarArg,
        gc::{GcHandle, HeapObject},
        value::{Value, hash_value_list},
    },
};

use super::VM;

impl VM {
    /// Calls the value sitting below the top `arg_count` stack slots.
    pub(super) fn execute_call(&mut self, arg_count: usize) -> Result<(), RuntimeError> {
        if arg_count >= self.sp {
            return Err(RuntimeError::stack_underflow());
        }
        let callee_slot = self.sp - arg_count - 1;
        let callee = self.stack[callee_slot];

        let Value::Object(handle) = callee else {
            return Err(self.not_callable_err(&callee));
        };

        match self.heap.get(handle) {
            HeapObject::Closure(_) => self.call_closure(handle, arg_count, true),
            HeapObject::ClassClosureBind(bind) => {
                let (receiver, closure) = (bind.receiver, bind.closure);
                self.stack[callee_slot] = receiver;
                // Nothing else roots the closure until its frame is pushed.
                self.heap.pin(closure);
                let result = self.call_closure(closure, arg_count, true);
                self.heap.unpin(closure);
                result
            }
            HeapObject::Class(class) => {
                let instance = HeapObject::ClassInstance(ClassInstance::new(handle, class));
                let instance = self.alloc(instance);
                self.stack[callee_slot] = Value::Object(instance);
                self.call_constructor(handle, arg_count)
            }
            HeapObject::ClassInstance(instance) => {
                let class = instance.class;
                self.call_constructor(class, arg_count)
            }
            HeapObject::Native(native) => {
                let func = Rc::clone(&native.func);
                let token = self.current_token();
                let args_start = self.sp - arg_count;
                let result = (*func)(&mut self.heap, &self.stack[args_start..self.sp], &token)?;
                self.sp = callee_slot;
                self.push(result.unwrap_or(Value::Nil))
            }
            _ => Err(self.not_callable_err(&callee)),
        }
    }

    fn current_token(&self) -> Token {
        self.frames
            .last()
            .and_then(|frame| frame.chunk.token_at(frame.ip).cloned())
            .unwrap_or_default()
    }

    /// Picks the constructor whose arity equals `arg_count`. The instance
    /// already sits in the callee slot as the receiver.
    fn call_constructor(&mut self, class: GcHandle, arg_count: usize) -> Result<(), RuntimeError> {
        let (name, constructor) = match self.heap.get(class).as_class() {
            Some(class) => (class.name.clone(), class.constructors.get(&arg_count).copied()),
            None => return Err(RuntimeError::invalid_bytecode("instance without a class")),
        };
        match constructor {
            Some(closure) => self.call_closure(closure, arg_count, false),
            None => Err(RuntimeError::arity(format!(
                "class {} has no constructor taking {} arguments",
                name, arg_count
            ))),
        }
    }

    /// Pushes a frame for `closure`, or replays a cached result when the
    /// function cache is on and this argument list was seen before.
    pub(super) fn call_closure(
        &mut self,
        closure: GcHandle,
        arg_count: usize,
        cacheable: bool,
    ) -> Result<(), RuntimeError> {
        let function_handle = match self.heap.get(closure).as_closure() {
            Some(closure) => closure.function,
            None => return Err(RuntimeError::invalid_bytecode("callee is not a closure")),
        };
        let (name, arity, var_arg, chunk) = match self.heap.get(function_handle).as_function() {
            Some(function) => (
                function.name.clone(),
                function.arity,
                function.var_arg,
                Rc::clone(&function.chunk),
            ),
            None => return Err(RuntimeError::invalid_bytecode("closure without a function")),
        };

        let arg_count = self.bind_arguments(&name, arity, var_arg, arg_count)?;
        let callee_slot = self.sp - arg_count - 1;

        let args_hash = (self.config.use_function_cache && cacheable)
            .then(|| hash_value_list(&self.stack[self.sp - arg_count..self.sp]));

        if let Some(hash) = args_hash {
            let cached = self
                .heap
                .get(function_handle)
                .as_function()
                .and_then(|function| function.cached(hash))
                .map(<[Value]>::to_vec);
            if let Some(results) = cached {
                self.sp = callee_slot;
                for value in results {
                    self.push(value)?;
                }
                return Ok(());
            }
        }

        if self.frames.len() >= self.config.frames_max {
            return Err(RuntimeError::new(
                ErrorKind::CallFrameOverflow,
                format!("call depth exceeded {} frames", self.config.frames_max),
            ));
        }

        let mut frame = Frame::new(closure, chunk, callee_slot);
        frame.args_hash = args_hash;
        self.frames.push(frame);
        Ok(())
    }

    /// Reconciles the pushed argument count with the callee's arity and
    /// returns the count the frame will see.
    ///
    /// Variadic functions fold or drop the surplus; a call one short of the
    /// arity leaves the trailing parameter empty.
    fn bind_arguments(
        &mut self,
        name: &str,
        arity: usize,
        var_arg: VarArg,
        arg_count: usize,
    ) -> Result<usize, RuntimeError> {
        if var_arg == VarArg::None {
            if arg_count != arity {
                return Err(Self::arity_err(name, arity, arg_count));
            }
            return Ok(arg_count);
        }
        if arity == 0 {
            return Err(RuntimeError::invalid_bytecode(format!(
                "variadic function {} declares no parameters",
                name
            )));
        }

        let named = var_arg == VarArg::TrailingNamed;
        if arg_count < arity {
            if arg_count + 1 != arity {
                return Err(Self::arity_err(name, arity, arg_count));
            }
            if !named {
                return Ok(arity - 1);
            }
            let empty = self.alloc(HeapObject::Array(Vec::new()));
            self.push(Value::Object(empty))?;
            return Ok(arity);
        }

        let surplus = arg_count - arity + 1;
        let start = self.sp - surplus;
        if !named {
            self.sp = start;
            return Ok(arity - 1);
        }
        let collected = self.build_array(surplus)?;
        debug_assert_eq!(self.sp, start);
        self.push(collected)?;
        Ok(arity)
    }

    #[cold]
    #[inline(never)]
    fn arity_err(name: &str, arity: usize, got: usize) -> RuntimeError {
        RuntimeError::arity(format!(
            "{} expects {} arguments, got {}",
            display_name(name),
            arity,
            got
        ))
    }

    #[cold]
    #[inline(never)]
    fn not_callable_err(&self, callee: &Value) -> RuntimeError {
        RuntimeError::new(
            ErrorKind::NotCallable,
            format!("cannot call {}", self.describe_kind(callee)),
        )
    }

    /// Returns `count` values from the current frame to its caller.
    ///
    /// The frame's slots are discarded (closing any upvalues over them) and
    /// the results take their place starting at the callee slot.
    pub(super) fn execute_return(&mut self, count: usize) -> Result<(), RuntimeError> {
        let (base, closure, args_hash) = {
            let frame = self.current_frame()?;
            (frame.base_pointer, frame.closure, frame.args_hash)
        };
        if count > self.sp.saturating_sub(base) {
            return Err(RuntimeError::stack_underflow());
        }

        let results = if count == 0 {
            vec![Value::Nil]
        } else {
            self.stack[self.sp - count..self.sp].to_vec()
        };

        self.close_upvalues(base);

        if let Some(hash) = args_hash {
            let function = self.heap.get(closure).as_closure().map(|c| c.function);
            if let Some(function) = function.and_then(|f| self.heap.get_mut(f).as_function_mut()) {
                function.store_cache(hash, results.clone());
            }
        }

        self.sp = base;
        for value in results {
            self.push(value)?;
        }
        self.frames.pop();
        Ok(())
    }

    /// Wraps the function constant in a closure and captures its upvalues.
    ///
    /// Each capture is `(index, depth)`: a depth equal to the current frame's
    /// depth captures the local at `index`; any other depth reuses the
    /// running closure's upvalue `index`.
    pub(super) fn execute_closure(
        &mut self,
        function: Value,
        captures: &[(usize, usize)],
    ) -> Result<(), RuntimeError> {
        let function_handle = function
            .as_handle()
            .filter(|handle| {
                self.heap
                    .try_get(*handle)
                    .and_then(HeapObject::as_function)
                    .is_some()
            })
            .ok_or_else(|| RuntimeError::invalid_bytecode("closure operand is not a function"))?;
        let upvalue_count = self
            .heap
            .get(function_handle)
            .as_function()
            .map_or(0, |function| function.upvalue_count);
        if upvalue_count != captures.len() {
            return Err(RuntimeError::invalid_bytecode(format!(
                "function captures {} upvalues but the instruction lists {}",
                upvalue_count,
                captures.len()
            )));
        }

        self.heap.pin(function_handle);
        let closure = self.alloc(HeapObject::Closure(Closure::new(
            function_handle,
            Vec::with_capacity(captures.len()),
        )));
        self.heap.unpin(function_handle);
        self.push(Value::Object(closure))?;

        let depth = self.frames.len() - 1;
        let base = self.current_frame()?.base_pointer;
        for &(index, capture_depth) in captures {
            let upvalue = if capture_depth == depth {
                self.capture_upvalue(base + index)
            } else {
                self.frame_upvalue(index)?
            };
            if let HeapObject::Closure(closure) = self.heap.get_mut(closure) {
                closure.upvalues.push(upvalue);
            }
        }
        Ok(())
    }

    /// Spreads an aggregate over `count` targets.
    ///
    /// Array elements are pushed last-first so element 0 ends on top; short
    /// arrays are padded with nil underneath. A non-array value fills the
    /// first target and the rest get nil.
    pub(super) fn execute_aggregate_resolve(&mut self, count: usize) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        let elements = self.array_elements(value);

        match elements {
            Some(elements) => {
                for _ in elements.len()..count {
                    self.push(Value::Nil)?;
                }
                let take = elements.len().min(count);
                for element in elements[..take].iter().rev() {
                    self.push(*element)?;
                }
            }
            None => {
                for _ in 1..count {
                    self.push(Value::Nil)?;
                }
                self.push(value)?;
            }
        }
        Ok(())
    }

    /// Like [`Self::execute_aggregate_resolve`], but the last target receives
    /// an array of every element past the fixed targets (empty when there
    /// are none).
    pub(super) fn execute_aggregate_resolve_var_arg(
        &mut self,
        count: usize,
    ) -> Result<(), RuntimeError> {
        if count == 0 {
            return Err(RuntimeError::invalid_bytecode(
                "variadic aggregate needs at least one target",
            ));
        }
        let value = self.peek(0)?;
        let elements = self.array_elements(value).unwrap_or_else(|| vec![value]);

        let fixed = count - 1;
        let rest = elements.get(fixed..).map(<[Value]>::to_vec).unwrap_or_default();
        let rest = self.alloc(HeapObject::Array(rest));
        self.pop()?;

        self.push(Value::Object(rest))?;
        for target in (0..fixed).rev() {
            self.push(elements.get(target).copied().unwrap_or(Value::Nil))?;
        }
        Ok(())
    }

    /// Reorders `count` values and their keys into `(value, key)` pairs.
    ///
    /// Expects all values pushed first, then all keys.
    pub(super) fn execute_init_var_arg(&mut self, count: usize) -> Result<(), RuntimeError> {
        if count * 2 > self.sp {
            return Err(RuntimeError::stack_underflow());
        }
        let keys_start = self.sp - count;
        let values_start = keys_start - count;
        let keys = self.stack[keys_start..self.sp].to_vec();
        let values = self.stack[values_start..keys_start].to_vec();

        self.sp = values_start;
        for (value, key) in values.into_iter().zip(keys) {
            self.push(value)?;
            self.push(key)?;
        }
        Ok(())
    }

    fn array_elements(&self, value: Value) -> Option<Vec<Value>> {
        let handle = self.deref(value).as_handle()?;
        self.heap.get(handle).as_array().cloned()
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<main>" } else { name }
}
