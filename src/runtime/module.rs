use std::collections::BTreeMap;

use crate::runtime::value::{Member, Value};

/// Named members with per-member mutability.
#[derive(Debug, Clone, Default)]
pub struct ModuleObject {
    pub name: String,
    pub members: BTreeMap<String, Member>,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }
}

/// Named cases; never assignable from scripts.
#[derive(Debug, Clone, Default)]
pub struct EnumObject {
    pub name: String,
    pub cases: BTreeMap<String, Value>,
}

impl EnumObject {
    pub fn new(name: impl Into<String>, cases: BTreeMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            cases,
        }
    }
}
