use crate::runtime::{gc::GcHandle, value::Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpValueState {
    /// Aliases an absolute stack slot of a live frame.
    Open(usize),
    /// Owns the value moved out of the stack when the frame ended.
    Closed(Value),
}

/// A captured variable shared by every closure that captured the same slot.
#[derive(Debug, Clone, PartialEq)]
pub struct UpValue {
    pub state: UpValueState,
    /// Next entry of the VM's open-upvalue chain, by descending slot.
    pub next: Option<GcHandle>,
}

impl UpValue {
    pub fn open(slot: usize, next: Option<GcHandle>) -> Self {
        Self {
            state: UpValueState::Open(slot),
            next,
        }
    }

    pub fn closed(value: Value) -> Self {
        Self {
            state: UpValueState::Closed(value),
            next: None,
        }
    }

    pub fn open_slot(&self) -> Option<usize> {
        match self.state {
            UpValueState::Open(slot) => Some(slot),
            UpValueState::Closed(_) => None,
        }
    }

    pub fn close(&mut self, value: Value) {
        self.state = UpValueState::Closed(value);
        self.next = None;
    }
}
