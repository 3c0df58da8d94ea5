use crate::{
    bytecode::op_code::OpCode,
    error::RuntimeError,
    runtime::{gc::HeapObject, value::Value},
};

use super::VM;

impl VM {
    /// Pops two operands (right on top) and pushes the result.
    ///
    /// String concatenation allocates while both operands are still on the
    /// stack.
    pub(super) fn execute_binary_operation(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let right = self.deref(self.peek(0)?);
        let left = self.deref(self.peek(1)?);

        let result = match (left, right) {
            (Value::Int(l), Value::Int(r)) => Self::integer_operation(op, l, r)?.map(Value::Int),
            (Value::Real(l), Value::Real(r)) => Self::real_operation(op, l, r),
            (Value::Int(l), Value::Real(r)) => Self::real_operation(op, l as f64, r),
            (Value::Real(l), Value::Int(r)) => Self::real_operation(op, l, r as f64),
            (Value::Bool(l), Value::Bool(r)) => match op {
                OpCode::OpAnd => Some(Value::Bool(l && r)),
                OpCode::OpOr => Some(Value::Bool(l || r)),
                _ => None,
            },
            (Value::Object(_), Value::Object(_)) if op == OpCode::OpAdd => {
                self.concat_strings(left, right)
            }
            _ => None,
        };
        let Some(result) = result else {
            return Err(self.binary_type_err(op, &left, &right));
        };

        self.drop_top(2)?;
        self.push(result)
    }

    fn concat_strings(&mut self, left: Value, right: Value) -> Option<Value> {
        let joined = format!("{}{}", self.string_value(left)?, self.string_value(right)?);
        Some(Value::Object(self.alloc(HeapObject::Str(joined))))
    }

    /// `None` when `op` is not defined on ints.
    fn integer_operation(op: OpCode, l: i64, r: i64) -> Result<Option<i64>, RuntimeError> {
        if r == 0 && matches!(op, OpCode::OpDiv | OpCode::OpMod) {
            return Err(RuntimeError::type_error("division by zero"));
        }
        let result = match op {
            OpCode::OpAdd => l.wrapping_add(r),
            OpCode::OpSub => l.wrapping_sub(r),
            OpCode::OpMul => l.wrapping_mul(r),
            OpCode::OpDiv => l.wrapping_div(r),
            OpCode::OpMod => l.wrapping_rem(r),
            OpCode::OpBitAnd => l & r,
            OpCode::OpBitOr => l | r,
            OpCode::OpBitXor => l ^ r,
            // wrapping_shl/shr use the low six bits of the shift amount
            OpCode::OpShiftLeft => l.wrapping_shl(r as u32),
            OpCode::OpShiftRight => l.wrapping_shr(r as u32),
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    /// Bitwise, shift, modulo and logical operators have no real form.
    fn real_operation(op: OpCode, l: f64, r: f64) -> Option<Value> {
        let result = match op {
            OpCode::OpAdd => l + r,
            OpCode::OpSub => l - r,
            OpCode::OpMul => l * r,
            OpCode::OpDiv => l / r,
            _ => return None,
        };
        Some(Value::Real(result))
    }

    #[cold]
    #[inline(never)]
    fn binary_type_err(&self, op: OpCode, left: &Value, right: &Value) -> RuntimeError {
        RuntimeError::type_error(format!(
            "unsupported operand types for {}: {} and {}",
            op,
            self.describe_kind(left),
            self.describe_kind(right)
        ))
    }

    /// Kind name used in messages; objects report their heap kind.
    pub(super) fn describe_kind(&self, value: &Value) -> String {
        match value {
            Value::Object(handle) => match self.heap.try_get(*handle) {
                Some(object) => object.kind().to_string(),
                None => "freed object".to_string(),
            },
            other => other.type_name().to_string(),
        }
    }

    pub(super) fn execute_unary_operation(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let operand = self.deref(self.peek(0)?);
        let result = match (op, operand) {
            (OpCode::OpNot, Value::Bool(b)) => Value::Bool(!b),
            (OpCode::OpBitNot, Value::Int(i)) => Value::Int(!i),
            (OpCode::OpMinus, Value::Int(i)) => Value::Int(i.wrapping_neg()),
            (OpCode::OpMinus, Value::Real(r)) => Value::Real(-r),
            (OpCode::OpFactorial, Value::Int(n)) => Value::Int(Self::factorial(n)?),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "unsupported operand type for {}: {}",
                    op,
                    self.describe_kind(&operand)
                )));
            }
        };
        self.drop_top(1)?;
        self.push(result)
    }

    fn factorial(n: i64) -> Result<i64, RuntimeError> {
        if n < 0 {
            return Err(RuntimeError::type_error(format!(
                "factorial of negative number {}",
                n
            )));
        }
        Ok((2..=n).fold(1i64, |acc, k| acc.wrapping_mul(k)))
    }
}
