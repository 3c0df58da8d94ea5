use std::rc::Rc;

use crate::{
    bytecode::{chunk::Chunk, op_code::OpCode},
    error::RuntimeError,
    runtime::{
        gc::HeapObject,
        reference::{RefTarget, Reference},
        value::Value,
    },
};

use super::VM;

impl VM {
    #[inline(always)]
    fn read_u8_operand(instructions: &[u8], offset: usize) -> Result<usize, RuntimeError> {
        match instructions.get(offset) {
            Some(byte) => Ok(*byte as usize),
            None => Err(Self::truncated_err(offset)),
        }
    }

    #[inline(always)]
    fn read_u16_operand(instructions: &[u8], offset: usize) -> Result<usize, RuntimeError> {
        match (instructions.get(offset), instructions.get(offset + 1)) {
            (Some(hi), Some(lo)) => Ok(((*hi as usize) << 8) | *lo as usize),
            _ => Err(Self::truncated_err(offset)),
        }
    }

    #[cold]
    #[inline(never)]
    fn truncated_err(offset: usize) -> RuntimeError {
        RuntimeError::invalid_bytecode(format!("instruction operand at {} is truncated", offset))
    }

    #[cold]
    #[inline(never)]
    fn bad_constant_err(index: usize) -> RuntimeError {
        RuntimeError::invalid_bytecode(format!("constant {} out of range", index))
    }

    /// Runs until the entry frame returns.
    pub(super) fn execute(&mut self) -> Result<(), RuntimeError> {
        while let Some(frame) = self.frames.last() {
            let frame_index = self.frames.len() - 1;
            let chunk = Rc::clone(&frame.chunk);
            let ip = frame.ip;

            let Some(&byte) = chunk.code.get(ip) else {
                return Err(RuntimeError::invalid_bytecode(format!(
                    "instruction pointer {} ran past the end of the chunk",
                    ip
                )));
            };
            let op = OpCode::try_from(byte).map_err(|byte| {
                RuntimeError::invalid_bytecode(format!("unknown opcode {} at {}", byte, ip))
            })?;

            if self.config.trace_execution {
                self.trace_instruction(&chunk, ip);
            }

            // Calls push a frame above `frame_index`, so the delta still
            // lands on the caller. Returns and jumps report zero.
            let ip_delta = self.dispatch_instruction(&chunk, ip, op)?;
            if ip_delta > 0 {
                self.frames[frame_index].ip += ip_delta;
            }
        }
        Ok(())
    }

    /// Executes one instruction and returns how far the frame's `ip` moves.
    pub(super) fn dispatch_instruction(
        &mut self,
        chunk: &Chunk,
        ip: usize,
        op: OpCode,
    ) -> Result<usize, RuntimeError> {
        let code = chunk.code.as_slice();
        match op {
            OpCode::OpConstant => {
                let index = Self::read_u16_operand(code, ip + 1)?;
                let value = *chunk
                    .constants
                    .get(index)
                    .ok_or_else(|| Self::bad_constant_err(index))?;
                self.push(value)?;
                Ok(3)
            }
            OpCode::OpNil => {
                self.push(Value::Nil)?;
                Ok(1)
            }
            OpCode::OpPop => {
                self.pop()?;
                Ok(1)
            }
            OpCode::OpGetGlobal => {
                let index = self.global_slot(Self::read_u16_operand(code, ip + 1)?)?;
                self.push(self.globals[index])?;
                Ok(3)
            }
            OpCode::OpSetGlobal => {
                let index = self.global_slot(Self::read_u16_operand(code, ip + 1)?)?;
                let value = self.peek(0)?;
                if !self.assign_through(self.globals[index], value)? {
                    self.globals[index] = value;
                }
                Ok(3)
            }
            OpCode::OpGetLocal => {
                let slot = self.local_slot(Self::read_u8_operand(code, ip + 1)?)?;
                self.push(self.stack[slot])?;
                Ok(2)
            }
            OpCode::OpSetLocal => {
                let slot = self.local_slot(Self::read_u8_operand(code, ip + 1)?)?;
                let value = self.peek(0)?;
                if !self.assign_through(self.stack[slot], value)? {
                    self.stack[slot] = value;
                }
                Ok(2)
            }
            OpCode::OpGetUpvalue => {
                let upvalue = self.frame_upvalue(Self::read_u8_operand(code, ip + 1)?)?;
                self.push(self.read_upvalue(upvalue))?;
                Ok(2)
            }
            OpCode::OpSetUpvalue => {
                let upvalue = self.frame_upvalue(Self::read_u8_operand(code, ip + 1)?)?;
                let value = self.peek(0)?;
                if !self.assign_through(self.read_upvalue(upvalue), value)? {
                    self.write_upvalue(upvalue, value);
                }
                Ok(2)
            }
            OpCode::OpCloseUpvalue => {
                if self.sp == 0 {
                    return Err(RuntimeError::stack_underflow());
                }
                self.close_upvalues(self.sp - 1);
                self.pop()?;
                Ok(1)
            }
            OpCode::OpRefGlobal => {
                let index = self.global_slot(Self::read_u16_operand(code, ip + 1)?)?;
                self.push_reference(RefTarget::Global(index))?;
                Ok(3)
            }
            OpCode::OpRefLocal => {
                let slot = self.local_slot(Self::read_u8_operand(code, ip + 1)?)?;
                self.push_reference(RefTarget::Stack(slot))?;
                Ok(2)
            }
            OpCode::OpRefUpvalue => {
                let upvalue = self.frame_upvalue(Self::read_u8_operand(code, ip + 1)?)?;
                self.push_reference(RefTarget::UpValue(upvalue))?;
                Ok(2)
            }
            OpCode::OpRefIndexGlobal => {
                let index = self.global_slot(Self::read_u16_operand(code, ip + 1)?)?;
                self.push_index_reference(self.globals[index])?;
                Ok(3)
            }
            OpCode::OpRefIndexLocal => {
                let slot = self.local_slot(Self::read_u8_operand(code, ip + 1)?)?;
                self.push_index_reference(self.stack[slot])?;
                Ok(2)
            }
            OpCode::OpRefIndexUpvalue => {
                let upvalue = self.frame_upvalue(Self::read_u8_operand(code, ip + 1)?)?;
                self.push_index_reference(self.read_upvalue(upvalue))?;
                Ok(2)
            }
            OpCode::OpAdd
            | OpCode::OpSub
            | OpCode::OpMul
            | OpCode::OpDiv
            | OpCode::OpMod
            | OpCode::OpBitAnd
            | OpCode::OpBitOr
            | OpCode::OpBitXor
            | OpCode::OpShiftLeft
            | OpCode::OpShiftRight
            | OpCode::OpAnd
            | OpCode::OpOr => {
                self.execute_binary_operation(op)?;
                Ok(1)
            }
            OpCode::OpBitNot | OpCode::OpNot | OpCode::OpMinus | OpCode::OpFactorial => {
                self.execute_unary_operation(op)?;
                Ok(1)
            }
            OpCode::OpLess | OpCode::OpGreater | OpCode::OpEqual => {
                self.execute_comparison_operation(op)?;
                Ok(1)
            }
            OpCode::OpArray => {
                let count = Self::read_u16_operand(code, ip + 1)?;
                let array = self.build_array(count)?;
                self.push(array)?;
                Ok(3)
            }
            OpCode::OpDict => {
                let count = Self::read_u16_operand(code, ip + 1)?;
                let dict = self.build_dict(count)?;
                self.push(dict)?;
                Ok(3)
            }
            OpCode::OpStruct => {
                let count = Self::read_u8_operand(code, ip + 1)?;
                let object = self.build_struct(count)?;
                self.push(object)?;
                Ok(2)
            }
            OpCode::OpGetIndex => {
                self.execute_get_index()?;
                Ok(1)
            }
            OpCode::OpSetIndex => {
                self.execute_set_index()?;
                Ok(1)
            }
            OpCode::OpJump => {
                let offset = Self::read_u16_operand(code, ip + 1)?;
                self.jump_to(ip + 3 + offset)?;
                Ok(0)
            }
            OpCode::OpJumpIfFalse => {
                let offset = Self::read_u16_operand(code, ip + 1)?;
                if self.peek(0)?.is_falsey() {
                    self.jump_to(ip + 3 + offset)?;
                    Ok(0)
                } else {
                    Ok(3)
                }
            }
            OpCode::OpLoop => {
                let offset = Self::read_u16_operand(code, ip + 1)?;
                let target = (ip + 3).checked_sub(offset).ok_or_else(|| {
                    RuntimeError::invalid_bytecode(format!("loop offset {} jumps before the chunk", offset))
                })?;
                self.jump_to(target)?;
                Ok(0)
            }
            OpCode::OpCall => {
                let arg_count = Self::read_u8_operand(code, ip + 1)?;
                self.execute_call(arg_count)?;
                Ok(2)
            }
            OpCode::OpReturn => {
                let count = Self::read_u8_operand(code, ip + 1)?;
                self.execute_return(count)?;
                Ok(0)
            }
            OpCode::OpClosure => {
                let index = Self::read_u16_operand(code, ip + 1)?;
                let count = Self::read_u8_operand(code, ip + 3)?;
                let mut captures = Vec::with_capacity(count);
                for i in 0..count {
                    let offset = ip + 4 + i * 2;
                    captures.push((
                        Self::read_u8_operand(code, offset)?,
                        Self::read_u8_operand(code, offset + 1)?,
                    ));
                }
                let function = *chunk
                    .constants
                    .get(index)
                    .ok_or_else(|| Self::bad_constant_err(index))?;
                self.execute_closure(function, &captures)?;
                Ok(4 + count * 2)
            }
            OpCode::OpClass => {
                let mut counts = [0usize; 6];
                for (i, count) in counts.iter_mut().enumerate() {
                    *count = Self::read_u8_operand(code, ip + 1 + i)?;
                }
                self.execute_class(counts)?;
                Ok(7)
            }
            OpCode::OpClassInstance => {
                self.execute_class_instance()?;
                Ok(1)
            }
            OpCode::OpGetProperty => {
                self.execute_get_property()?;
                Ok(1)
            }
            OpCode::OpSetProperty => {
                self.execute_set_property()?;
                Ok(1)
            }
            OpCode::OpGetBase => {
                self.execute_get_base()?;
                Ok(1)
            }
            OpCode::OpModule => {
                let var_count = Self::read_u8_operand(code, ip + 1)?;
                let const_count = Self::read_u8_operand(code, ip + 2)?;
                self.execute_module(var_count, const_count)?;
                Ok(3)
            }
            OpCode::OpAggregateResolve => {
                let count = Self::read_u8_operand(code, ip + 1)?;
                self.execute_aggregate_resolve(count)?;
                Ok(2)
            }
            OpCode::OpAggregateResolveVarArg => {
                let count = Self::read_u8_operand(code, ip + 1)?;
                self.execute_aggregate_resolve_var_arg(count)?;
                Ok(2)
            }
            OpCode::OpInitVarArg => {
                let count = Self::read_u8_operand(code, ip + 1)?;
                self.execute_init_var_arg(count)?;
                Ok(2)
            }
        }
    }

    fn jump_to(&mut self, target: usize) -> Result<(), RuntimeError> {
        self.current_frame_mut()?.ip = target;
        Ok(())
    }

    fn push_reference(&mut self, target: RefTarget) -> Result<(), RuntimeError> {
        let reference = self.alloc(HeapObject::Ref(Reference::new(target)));
        self.push(Value::Object(reference))
    }
}
