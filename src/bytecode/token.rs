use std::fmt;

use serde::{Deserialize, Serialize};

/// Source token attached to an instruction for diagnostics.
///
/// The front-end produces these; the VM only clones them into errors and
/// hands them to native functions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Token {
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
    pub file: Option<String>,
}

impl Token {
    pub fn new(lexeme: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            lexeme: lexeme.into(),
            line,
            column,
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}
