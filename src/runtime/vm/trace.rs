use crate::{
    bytecode::{chunk::Chunk, op_code::disassemble_instruction},
    error::RuntimeError,
    runtime::frame::Frame,
};

use super::VM;

impl VM {
    /// Logs the instruction at `ip` and the live stack at trace level.
    pub(super) fn trace_instruction(&self, chunk: &Chunk, ip: usize) {
        let stack = self.stack[..self.sp]
            .iter()
            .map(|value| format!("[ {} ]", self.render(value)))
            .collect::<String>();
        log::trace!("          {}", stack);

        match disassemble_instruction(&chunk.code, ip) {
            Some((text, _)) => log::trace!("{}", text),
            None => log::trace!("{:04} <invalid {}>", ip, chunk.code[ip]),
        }
    }

    /// Attaches the failing instruction's token and the call stack.
    pub(super) fn decorate_error(&self, err: RuntimeError) -> RuntimeError {
        let token = self
            .frames
            .last()
            .and_then(|frame| frame.chunk.token_at(frame.ip));
        let stack_trace = self.stack_trace();
        log::debug!("runtime error: {}", err);
        err.with_token(token).with_stack_trace(stack_trace)
    }

    /// One line per active frame, innermost first: `name (line:column)`.
    pub(super) fn stack_trace(&self) -> Vec<String> {
        let innermost = self.frames.len().saturating_sub(1);
        self.frames
            .iter()
            .enumerate()
            .rev()
            .map(|(depth, frame)| {
                // Callers have already stepped past their call instruction.
                let ip = if depth == innermost {
                    frame.ip
                } else {
                    frame.ip.saturating_sub(1)
                };
                let name = self.frame_function_name(frame);
                match frame.chunk.token_at(ip) {
                    Some(token) => format!("{} ({})", name, token),
                    None => name,
                }
            })
            .collect()
    }

    fn frame_function_name(&self, frame: &Frame) -> String {
        let name = self
            .heap
            .try_get(frame.closure)
            .and_then(|object| object.as_closure())
            .and_then(|closure| self.heap.try_get(closure.function))
            .and_then(|object| object.as_function())
            .map(|function| function.name.as_str())
            .unwrap_or_default();
        if name.is_empty() {
            "<main>".to_string()
        } else {
            name.to_string()
        }
    }
}
