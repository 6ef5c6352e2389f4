//! Module name registry.
//!
//! Output formats index cells by name, so every module added to a
//! [crate::Library] must hold a name no other module uses, unless its kind
//! declares that rebuilt copies may share one.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::database::ModuleKey;

/// Registry entry for one module name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredName {
    /// Kind of the module first registered under this name
    pub kind: String,
    /// Arena handle of that module
    pub key: ModuleKey,
}

/// Names handed out during one generation run, in registration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameRegistry {
    names: IndexMap<String, RegisteredName>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredName> {
        self.names.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Record `name`. Callers check [NameRegistry::lookup] first; an existing
    /// entry is left untouched.
    pub fn register(&mut self, name: &str, kind: &str, key: ModuleKey) {
        self.names
            .entry(name.to_string())
            .or_insert_with(|| RegisteredName {
                kind: kind.to_string(),
                key,
            });
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
