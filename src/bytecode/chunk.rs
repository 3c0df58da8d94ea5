use crate::{
    bytecode::{
        op_code::{Instructions, OpCode, make},
        token::Token,
    },
    runtime::value::Value,
};

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionLocation {
    pub offset: usize,
    pub token: Token,
}

/// Code, constant pool and per-instruction source tokens of one function.
///
/// Constants may hold heap handles; they are traced through the owning
/// function object, so a chunk must only be executed while that function
/// is reachable.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Instructions,
    pub constants: Vec<Value>,
    pub locations: Vec<InstructionLocation>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Appends an instruction and records `token` for its offset.
    ///
    /// Returns the offset of the opcode byte.
    pub fn emit(&mut self, op: OpCode, operands: &[usize], token: Token) -> usize {
        let offset = self.code.len();
        self.code.extend(make(op, operands));
        self.locations.push(InstructionLocation { offset, token });
        offset
    }

    pub fn emit_constant(&mut self, value: Value, token: Token) -> usize {
        let index = self.add_constant(value);
        self.emit(OpCode::OpConstant, &[index], token)
    }

    /// Emits a forward jump with a placeholder offset; returns the offset of
    /// its operand for [`Chunk::patch_jump`].
    pub fn emit_jump(&mut self, op: OpCode, token: Token) -> usize {
        self.emit(op, &[0xffff], token) + 1
    }

    /// Points the jump whose operand sits at `operand` to the current end of
    /// code.
    pub fn patch_jump(&mut self, operand: usize) -> Result<(), String> {
        let distance = self.code.len() - operand - 2;
        if distance > u16::MAX as usize {
            return Err(format!("jump distance {} does not fit in u16", distance));
        }
        self.code[operand] = (distance >> 8) as u8;
        self.code[operand + 1] = distance as u8;
        Ok(())
    }

    /// Emits a backward jump to `loop_start`.
    pub fn emit_loop(&mut self, loop_start: usize, token: Token) -> Result<usize, String> {
        let distance = self.code.len() + 3 - loop_start;
        if distance > u16::MAX as usize {
            return Err(format!("loop body of {} bytes is too large", distance));
        }
        Ok(self.emit(OpCode::OpLoop, &[distance], token))
    }

    /// Emits `OpClosure` for the function constant at `constant`, capturing
    /// each `(index, depth)` pair.
    pub fn emit_closure(
        &mut self,
        constant: usize,
        captures: &[(u8, u8)],
        token: Token,
    ) -> usize {
        let mut operands = Vec::with_capacity(2 + captures.len() * 2);
        operands.push(constant);
        operands.push(captures.len());
        for (index, depth) in captures {
            operands.push(*index as usize);
            operands.push(*depth as usize);
        }
        self.emit(OpCode::OpClosure, &operands, token)
    }

    /// Token of the instruction covering `ip`.
    pub fn token_at(&self, ip: usize) -> Option<&Token> {
        match self.locations.binary_search_by_key(&ip, |entry| entry.offset) {
            Ok(index) => self.locations.get(index).map(|entry| &entry.token),
            Err(index) => index
                .checked_sub(1)
                .and_then(|prev| self.locations.get(prev))
                .map(|entry| &entry.token),
        }
    }
}
