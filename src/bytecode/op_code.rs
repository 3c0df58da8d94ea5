use std::fmt;

/// Instruction set of the VM.
///
/// Every instruction is one opcode byte followed by the operands listed in
/// [`operand_widths`]. Multi-byte operands are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    OpConstant = 0,
    OpNil = 1,
    OpPop = 2,
    OpGetGlobal = 3,
    OpSetGlobal = 4,
    OpGetLocal = 5,
    OpSetLocal = 6,
    OpGetUpvalue = 7,
    OpSetUpvalue = 8,
    OpCloseUpvalue = 9,
    OpRefGlobal = 10,
    OpRefLocal = 11,
    OpRefUpvalue = 12,
    OpRefIndexGlobal = 13,
    OpRefIndexLocal = 14,
    OpRefIndexUpvalue = 15,
    OpAdd = 16,
    OpSub = 17,
    OpMul = 18,
    OpDiv = 19,
    OpMod = 20,
    OpBitAnd = 21,
    OpBitOr = 22,
    OpBitXor = 23,
    OpBitNot = 24,
    OpShiftLeft = 25,
    OpShiftRight = 26,
    OpLess = 27,
    OpGreater = 28,
    OpEqual = 29,
    OpAnd = 30,
    OpOr = 31,
    OpNot = 32,
    OpMinus = 33,
    OpFactorial = 34,
    OpArray = 35,
    OpDict = 36,
    OpStruct = 37,
    OpGetIndex = 38,
    OpSetIndex = 39,
    OpJump = 40,
    OpJumpIfFalse = 41,
    OpLoop = 42,
    OpCall = 43,
    OpReturn = 44,
    /// `const:u16 count:u8` followed by `count` pairs of `index:u8 depth:u8`.
    OpClosure = 45,
    /// Six u8 counts: constructors, parents, vars, consts, functions, enums.
    OpClass = 46,
    OpClassInstance = 47,
    OpGetProperty = 48,
    OpSetProperty = 49,
    OpGetBase = 50,
    /// Two u8 counts: vars, consts.
    OpModule = 51,
    OpAggregateResolve = 52,
    OpAggregateResolveVarArg = 53,
    OpInitVarArg = 54,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let op = match byte {
            0 => OpCode::OpConstant,
            1 => OpCode::OpNil,
            2 => OpCode::OpPop,
            3 => OpCode::OpGetGlobal,
            4 => OpCode::OpSetGlobal,
            5 => OpCode::OpGetLocal,
            6 => OpCode::OpSetLocal,
            7 => OpCode::OpGetUpvalue,
            8 => OpCode::OpSetUpvalue,
            9 => OpCode::OpCloseUpvalue,
            10 => OpCode::OpRefGlobal,
            11 => OpCode::OpRefLocal,
            12 => OpCode::OpRefUpvalue,
            13 => OpCode::OpRefIndexGlobal,
            14 => OpCode::OpRefIndexLocal,
            15 => OpCode::OpRefIndexUpvalue,
            16 => OpCode::OpAdd,
            17 => OpCode::OpSub,
            18 => OpCode::OpMul,
            19 => OpCode::OpDiv,
            20 => OpCode::OpMod,
            21 => OpCode::OpBitAnd,
            22 => OpCode::OpBitOr,
            23 => OpCode::OpBitXor,
            24 => OpCode::OpBitNot,
            25 => OpCode::OpShiftLeft,
            26 => OpCode::OpShiftRight,
            27 => OpCode::OpLess,
            28 => OpCode::OpGreater,
            29 => OpCode::OpEqual,
            30 => OpCode::OpAnd,
            31 => OpCode::OpOr,
            32 => OpCode::OpNot,
            33 => OpCode::OpMinus,
            34 => OpCode::OpFactorial,
            35 => OpCode::OpArray,
            36 => OpCode::OpDict,
            37 => OpCode::OpStruct,
            38 => OpCode::OpGetIndex,
            39 => OpCode::OpSetIndex,
            40 => OpCode::OpJump,
            41 => OpCode::OpJumpIfFalse,
            42 => OpCode::OpLoop,
            43 => OpCode::OpCall,
            44 => OpCode::OpReturn,
            45 => OpCode::OpClosure,
            46 => OpCode::OpClass,
            47 => OpCode::OpClassInstance,
            48 => OpCode::OpGetProperty,
            49 => OpCode::OpSetProperty,
            50 => OpCode::OpGetBase,
            51 => OpCode::OpModule,
            52 => OpCode::OpAggregateResolve,
            53 => OpCode::OpAggregateResolveVarArg,
            54 => OpCode::OpInitVarArg,
            _ => return Err(byte),
        };
        Ok(op)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Fixed operand widths in bytes.
///
/// `OpClosure` additionally carries `2 * count` trailing u8 operands, which
/// [`make`] and [`disassemble`] handle separately.
pub fn operand_widths(op: OpCode) -> &'static [usize] {
    match op {
        OpCode::OpConstant
        | OpCode::OpGetGlobal
        | OpCode::OpSetGlobal
        | OpCode::OpRefGlobal
        | OpCode::OpRefIndexGlobal
        | OpCode::OpArray
        | OpCode::OpDict
        | OpCode::OpJump
        | OpCode::OpJumpIfFalse
        | OpCode::OpLoop => &[2],
        OpCode::OpGetLocal
        | OpCode::OpSetLocal
        | OpCode::OpGetUpvalue
        | OpCode::OpSetUpvalue
        | OpCode::OpRefLocal
        | OpCode::OpRefUpvalue
        | OpCode::OpRefIndexLocal
        | OpCode::OpRefIndexUpvalue
        | OpCode::OpStruct
        | OpCode::OpCall
        | OpCode::OpReturn
        | OpCode::OpAggregateResolve
        | OpCode::OpAggregateResolveVarArg
        | OpCode::OpInitVarArg => &[1],
        OpCode::OpClosure => &[2, 1],
        OpCode::OpClass => &[1, 1, 1, 1, 1, 1],
        OpCode::OpModule => &[1, 1],
        _ => &[],
    }
}

pub type Instructions = Vec<u8>;

/// Encodes one instruction.
///
/// Operands past the fixed widths (the capture pairs of `OpClosure`) are
/// written as single bytes.
pub fn make(op: OpCode, operands: &[usize]) -> Instructions {
    let widths = operand_widths(op);
    let mut instruction = vec![op as u8];

    for (i, operand) in operands.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(1);
        match width {
            1 => instruction.push(*operand as u8),
            2 => {
                instruction.push((*operand >> 8) as u8);
                instruction.push(*operand as u8);
            }
            _ => {}
        }
    }

    instruction
}

pub fn read_u16(instructions: &[u8], offset: usize) -> u16 {
    ((instructions[offset] as u16) << 8) | (instructions[offset + 1] as u16)
}

pub fn read_u8(instructions: &[u8], offset: usize) -> u8 {
    instructions[offset]
}

/// Decodes the operands of the instruction at `offset`.
///
/// Returns the operands and the offset of the next instruction, or `None`
/// when the stream is truncated or the opcode is unknown.
pub fn decode(instructions: &[u8], offset: usize) -> Option<(OpCode, Vec<usize>, usize)> {
    let op = OpCode::try_from(*instructions.get(offset)?).ok()?;
    let mut operands = Vec::new();
    let mut cursor = offset + 1;

    for width in operand_widths(op) {
        if cursor + width > instructions.len() {
            return None;
        }
        match width {
            1 => operands.push(read_u8(instructions, cursor) as usize),
            _ => operands.push(read_u16(instructions, cursor) as usize),
        }
        cursor += width;
    }

    if op == OpCode::OpClosure {
        let captures = operands[1] * 2;
        if cursor + captures > instructions.len() {
            return None;
        }
        for i in 0..captures {
            operands.push(read_u8(instructions, cursor + i) as usize);
        }
        cursor += captures;
    }

    Some((op, operands, cursor))
}

/// Renders a single instruction as `OFFSET OpName operands...`.
pub fn disassemble_instruction(instructions: &[u8], offset: usize) -> Option<(String, usize)> {
    let (op, operands, next) = decode(instructions, offset)?;
    let mut line = format!("{:04} {}", offset, op);
    for operand in operands {
        line.push(' ');
        line.push_str(&operand.to_string());
    }
    Some((line, next))
}

pub fn disassemble(instructions: &[u8]) -> String {
    let mut result = String::new();
    let mut i = 0;

    while i < instructions.len() {
        match disassemble_instruction(instructions, i) {
            Some((line, next)) => {
                result.push_str(&line);
                result.push('\n');
                i = next;
            }
            None => {
                result.push_str(&format!("{:04} <invalid {}>\n", i, instructions[i]));
                i += 1;
            }
        }
    }

    result
}
