//! Runtime errors surfaced by the VM.

use std::fmt;

use thiserror::Error;

use crate::bytecode::token::Token;

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operand kinds not accepted by an operator
    Type,
    /// Property or member lookup failed
    UndefinedMember,
    /// Dictionary read with an absent key
    MissingKey,
    IndexOutOfRange,
    /// Index of the wrong kind, or an unindexable receiver
    InvalidIndex,
    /// Argument count does not match any accepted arity
    Arity,
    /// Write to a constant member
    ImmutableAssignment,
    NotCallable,
    StackOverflow,
    StackUnderflow,
    CallFrameOverflow,
    /// Malformed instruction stream or constant pool
    InvalidBytecode,
    /// Raised by an embedder-supplied native function
    Native,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Type => "type error",
            ErrorKind::UndefinedMember => "undefined member",
            ErrorKind::MissingKey => "missing key",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::InvalidIndex => "invalid index",
            ErrorKind::Arity => "arity mismatch",
            ErrorKind::ImmutableAssignment => "immutable assignment",
            ErrorKind::NotCallable => "not callable",
            ErrorKind::StackOverflow => "stack overflow",
            ErrorKind::StackUnderflow => "stack underflow",
            ErrorKind::CallFrameOverflow => "call frame overflow",
            ErrorKind::InvalidBytecode => "invalid bytecode",
            ErrorKind::Native => "native error",
        };
        f.write_str(name)
    }
}

/// Runtime error during execution.
///
/// Every error halts the current `run`; the embedder decides whether to
/// continue with another one.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}{}", location_suffix(.token))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Token of the failing instruction, attached by the interpreter loop.
    pub token: Option<Token>,
    /// One line per active call frame, innermost first.
    pub stack_trace: Vec<String>,
}

fn location_suffix(token: &Option<Token>) -> String {
    match token {
        Some(token) => format!(" at {}", token),
        None => String::new(),
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            token: None,
            stack_trace: Vec::new(),
        }
    }

    /// Attaches `token` unless the error already carries one.
    pub fn with_token(mut self, token: Option<&Token>) -> Self {
        if self.token.is_none() {
            self.token = token.cloned();
        }
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: Vec<String>) -> Self {
        self.stack_trace = stack_trace;
        self
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn undefined_member(name: &str, owner: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedMember,
            format!("no member '{name}' in {owner}"),
        )
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(
            ErrorKind::IndexOutOfRange,
            format!("index {index} out of range for length {len}"),
        )
    }

    pub fn invalid_index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidIndex, message)
    }

    pub fn arity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arity, message)
    }

    pub fn immutable(name: &str, owner: &str) -> Self {
        Self::new(
            ErrorKind::ImmutableAssignment,
            format!("{owner}'s member '{name}' is a constant and cannot be assigned"),
        )
    }

    pub fn stack_underflow() -> Self {
        Self::new(ErrorKind::StackUnderflow, "stack underflow")
    }

    pub fn invalid_bytecode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidBytecode, message)
    }

    pub fn native(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Native, message)
    }

    /// Renders the message followed by the stack trace, one frame per line.
    pub fn report(&self) -> String {
        let mut rendered = self.to_string();
        if !self.stack_trace.is_empty() {
            rendered.push_str("\n\nStack trace:");
            for frame in &self.stack_trace {
                rendered.push_str("\n  at ");
                rendered.push_str(frame);
            }
        }
        rendered
    }
}
