use std::fs;
use std::path::Path;

use cellweave_core::{LayerTable, Library};
use serde::{Deserialize, Serialize};

use crate::error::{RuleError, RuleResult};
use crate::rules::DesignRules;
use crate::table::RuleTable;

/// A bottom conductor, cut and top conductor that together form a via.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViaStack {
    pub bottom: String,
    pub cut: String,
    pub top: String,
}

impl ViaStack {
    pub fn new(bottom: &str, cut: &str, top: &str) -> Self {
        Self {
            bottom: bottom.to_string(),
            cut: cut.to_string(),
            top: top.to_string(),
        }
    }

    pub fn layers(&self) -> [&str; 3] {
        [&self.bottom, &self.cut, &self.top]
    }
}

impl std::fmt::Display for ViaStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.bottom, self.cut, self.top)
    }
}

/// Process technology: grid, layer numbers, design rules and via stacks.
///
/// Loaded from YAML or JSON:
///
/// ```yaml
/// name: demo
/// grid: 0.005
/// layers:
///   metal1: { layer: 68, purpose: 20 }
/// rules:
///   minwidth_metal1: 0.14
/// stacks:
///   - { bottom: metal1, cut: via1, top: metal2 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    /// Manufacturing grid, microns.
    pub grid: f64,
    pub layers: LayerTable,
    #[serde(default)]
    pub rules: RuleTable,
    #[serde(default)]
    pub stacks: Vec<ViaStack>,
}

impl Technology {
    pub fn new(name: &str, grid: f64, layers: LayerTable, rules: RuleTable) -> Self {
        Self {
            name: name.to_string(),
            grid,
            layers,
            rules,
            stacks: Vec::new(),
        }
    }

    pub fn with_stack(mut self, stack: ViaStack) -> Self {
        self.stacks.push(stack);
        self
    }

    /// Load from a `.yaml`/`.yml` or `.json` file; other extensions are read as YAML.
    pub fn load(path: &Path) -> RuleResult<Self> {
        let text = fs::read_to_string(path)?;
        let tech = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text)?,
            _ => Self::from_yaml(&text)?,
        };
        log::info!(
            "loaded technology '{}' from {} ({} layers, {} rules, {} stacks)",
            tech.name,
            path.display(),
            tech.layers.layer_count(),
            tech.rules.len(),
            tech.stacks.len()
        );
        Ok(tech)
    }

    pub fn from_yaml(text: &str) -> RuleResult<Self> {
        let tech: Self = serde_yaml::from_str(text)?;
        tech.validate()?;
        Ok(tech)
    }

    pub fn from_json(text: &str) -> RuleResult<Self> {
        let tech: Self = serde_json::from_str(text)?;
        tech.validate()?;
        Ok(tech)
    }

    pub fn to_yaml(&self) -> RuleResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject a non-positive grid and stacks naming undeclared layers.
    pub fn validate(&self) -> RuleResult<()> {
        if !self.grid.is_finite() || self.grid <= 0.0 {
            return Err(RuleError::InvalidGrid(self.grid));
        }
        for stack in &self.stacks {
            if let Some(layer) = stack.layers().iter().find(|l| !self.layers.contains(l)) {
                return Err(RuleError::UnknownStackLayer {
                    stack: stack.to_string(),
                    layer: layer.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> DesignRules<'_> {
        DesignRules::new(&self.rules, self.grid)
    }

    /// An empty library on this technology's grid and layers.
    pub fn library(&self, name: &str) -> Library {
        Library::new(name, self.layers.clone(), self.grid)
    }

    /// The stack whose cut layer is `cut`.
    pub fn stack_for_cut(&self, cut: &str) -> Option<&ViaStack> {
        self.stacks.iter().find(|s| s.cut == cut)
    }

    /// The stack joining conductors `a` and `b`, in either order.
    pub fn stack_between(&self, a: &str, b: &str) -> Option<&ViaStack> {
        self.stacks
            .iter()
            .find(|s| (s.bottom == a && s.top == b) || (s.bottom == b && s.top == a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TECH: &str = r#"
name: demo
grid: 0.005
layers:
  active: { layer: 65, purpose: 20 }
  poly: { layer: 66, purpose: 20 }
  contact: { layer: 66, purpose: 44 }
  metal1: { layer: 68, purpose: 20 }
  via1: { layer: 68, purpose: 44 }
  metal2: { layer: 69, purpose: 20 }
  pwell: { layer: -1, purpose: -1 }
rules:
  minwidth_metal1: 0.14
  minwidth_via1: 0.2
  via1_to_via1: 0.2
  metal1_enclosure_via1: 0.06
stacks:
  - { bottom: active, cut: contact, top: metal1 }
  - { bottom: metal1, cut: via1, top: metal2 }
"#;

    #[test]
    fn test_load_yaml() {
        let tech = Technology::from_yaml(TECH).unwrap();
        assert_eq!(tech.name, "demo");
        assert_eq!(tech.layers.layer_count(), 7);
        assert_eq!(tech.rules.len(), 4);
        assert_eq!(tech.stacks.len(), 2);
        assert!(!tech.layers.get("pwell").unwrap().is_present());
        assert!((tech.rules().min_width("via1").unwrap() - 0.2).abs() < 1e-9);

        let stack = tech.stack_for_cut("via1").unwrap();
        assert_eq!(stack, &ViaStack::new("metal1", "via1", "metal2"));
        assert_eq!(tech.stack_between("metal1", "active").unwrap().cut, "contact");
        assert!(tech.stack_between("metal2", "active").is_none());
    }

    #[test]
    fn test_yaml_and_json_agree() {
        let tech = Technology::from_yaml(TECH).unwrap();
        let json = serde_json::to_string(&tech).unwrap();
        let again = Technology::from_json(&json).unwrap();
        assert_eq!(again.stacks, tech.stacks);
        assert_eq!(again.rules.get("via1_to_via1"), Some(0.2));
        let yaml = tech.to_yaml().unwrap();
        assert_eq!(Technology::from_yaml(&yaml).unwrap().layers.layer_count(), 7);
    }

    #[test]
    fn test_validation() {
        let bad_grid = TECH.replace("grid: 0.005", "grid: 0.0");
        assert!(matches!(
            Technology::from_yaml(&bad_grid),
            Err(RuleError::InvalidGrid(_))
        ));

        let bad_stack = format!("{TECH}  - {{ bottom: metal2, cut: via2, top: metal3 }}\n");
        match Technology::from_yaml(&bad_stack) {
            Err(RuleError::UnknownStackLayer { layer, .. }) => assert_eq!(layer, "via2"),
            other => panic!("unexpected {other:?}"),
        }

        let built = Technology::new(
            "partial",
            0.005,
            LayerTable::new().with_layer("metal1", 68, 20),
            RuleTable::new(),
        )
        .with_stack(ViaStack::new("metal1", "via1", "metal2"));
        assert!(matches!(
            built.validate(),
            Err(RuleError::UnknownStackLayer { .. })
        ));
    }

    #[test]
    fn test_library_uses_tech_grid() {
        let tech = Technology::from_yaml(TECH).unwrap();
        let lib = tech.library("demo_lib");
        assert!((lib.grid() - 0.005).abs() < 1e-12);
        assert!(lib.layer("metal2").is_ok());
    }
}
