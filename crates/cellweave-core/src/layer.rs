use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

/// A GDS layer number.
pub type LayerId = u32;
/// A GDS datatype (purpose) number.
pub type PurposeId = u32;

/// Layer/purpose numbers as written in a technology description.
/// A negative number marks a layer that does not exist in the technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerNumbers {
    pub layer: i32,
    #[serde(default)]
    pub purpose: i32,
}

/// A resolved technology layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub gds_layer: i32,
    pub gds_datatype: i32,
}

impl Layer {
    pub fn new(name: &str, gds_layer: i32, gds_datatype: i32) -> Self {
        Self {
            name: name.to_string(),
            gds_layer,
            gds_datatype,
        }
    }

    /// Whether the layer exists in this technology.
    pub fn is_present(&self) -> bool {
        self.gds_layer >= 0 && self.gds_datatype >= 0
    }

    /// Numeric layer and purpose, or `None` for an absent layer.
    pub fn id(&self) -> Option<(LayerId, PurposeId)> {
        if self.is_present() {
            Some((self.gds_layer as LayerId, self.gds_datatype as PurposeId))
        } else {
            None
        }
    }
}

/// Symbolic layer name to layer/purpose numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerTable {
    layers: IndexMap<String, LayerNumbers>,
}

impl LayerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, name: &str, gds_layer: i32, gds_datatype: i32) {
        self.layers.insert(
            name.to_string(),
            LayerNumbers {
                layer: gds_layer,
                purpose: gds_datatype,
            },
        );
    }

    pub fn with_layer(mut self, name: &str, gds_layer: i32, gds_datatype: i32) -> Self {
        self.add_layer(name, gds_layer, gds_datatype);
        self
    }

    /// Resolve `name`. Absent layers resolve successfully; unknown names do not.
    pub fn get(&self, name: &str) -> LayoutResult<Layer> {
        self.layers
            .get(name)
            .map(|n| Layer::new(name, n.layer, n.purpose))
            .ok_or_else(|| LayoutError::UnknownLayer(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Reverse lookup by numbers, used to name shapes in diagnostics.
    pub fn name_of(&self, layer: LayerId, purpose: PurposeId) -> Option<&str> {
        self.layers
            .iter()
            .find(|(_, n)| n.layer == layer as i32 && n.purpose == purpose as i32)
            .map(|(name, _)| name.as_str())
    }

    pub fn all_layers(&self) -> impl Iterator<Item = Layer> + '_ {
        self.layers
            .iter()
            .map(|(name, n)| Layer::new(name, n.layer, n.purpose))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
