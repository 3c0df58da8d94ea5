use std::cmp::Ordering;

use crate::{
    bytecode::op_code::OpCode,
    error::RuntimeError,
    runtime::{object::values_equal, value::Value},
};

use super::VM;

impl VM {
    pub(super) fn execute_comparison_operation(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let right = self.deref(right);
        let left = self.pop()?;
        let left = self.deref(left);

        let result = match op {
            OpCode::OpEqual => values_equal(&self.heap, &left, &right),
            OpCode::OpLess => Self::numeric_ordering(&left, &right) == Some(Ordering::Less),
            OpCode::OpGreater => Self::numeric_ordering(&left, &right) == Some(Ordering::Greater),
            _ => {
                return Err(RuntimeError::invalid_bytecode(format!(
                    "{} is not a comparison",
                    op
                )));
            }
        };
        self.push(Value::Bool(result))
    }

    /// Ordering exists only between numbers; other pairings are unordered.
    fn numeric_ordering(left: &Value, right: &Value) -> Option<Ordering> {
        match (left, right) {
            (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
            _ => left.as_real()?.partial_cmp(&right.as_real()?),
        }
    }
}
