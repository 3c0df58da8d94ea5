//! Runtime core for CynicScript: tagged values, a garbage-collected object
//! graph and a stack-based bytecode interpreter.
//!
//! A front-end produces [`bytecode::chunk::Chunk`]s, wraps them in
//! [`runtime::function::Function`] objects on the VM's heap and hands the
//! entry function to [`VM::run`].

pub mod bytecode;
pub mod config;
pub mod error;
pub mod runtime;

pub use config::VmConfig;
pub use error::{ErrorKind, RuntimeError};
pub use runtime::value::Value;
pub use runtime::vm::VM;
