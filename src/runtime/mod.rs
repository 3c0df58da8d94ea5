//! Runtime core: values, heap objects, the collector and the VM.
//!
//! Every composite value lives on the [`gc::GcHeap`] and is reached through
//! a [`gc::GcHandle`]. Cycles are allowed; the mark-sweep collector reclaims
//! them once no root reaches them.

pub mod class;
pub mod closure;
pub mod frame;
pub mod function;
pub mod gc;
pub mod module;
pub mod native_function;
pub mod object;
pub mod reference;
pub mod upvalue;
pub mod value;
pub mod vm;
