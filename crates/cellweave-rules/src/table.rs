use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Flat key/value rule table as supplied by a technology description.
///
/// Values are in microns (areas in square microns).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: HashMap<String, f64>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: f64) {
        self.rules.insert(key.to_string(), value);
    }

    pub fn with_rule(mut self, key: &str, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.rules.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
