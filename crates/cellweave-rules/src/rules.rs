//! Design-rule resolution.
//!
//! Rules are looked up by conventional keys (`minwidth_<layer>`,
//! `<layer>_to_<layer>`, `<layer>_enclosure_<layer>`, ...). Several lookups
//! fall back to more generic keys so a technology only spells out a rule
//! where it differs.

use cellweave_core::geometry::ceil_to_grid;

use crate::class::LayerClass;
use crate::error::{RuleError, RuleResult};
use crate::table::RuleTable;

/// Geometry of the two shapes whose spacing is being asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpacingQuery {
    /// Width of the wider shape.
    pub max_width: f64,
    /// Width of the narrower shape.
    pub min_width: f64,
    /// Length over which the shapes run side by side, if known.
    pub run_length: Option<f64>,
    /// Heights of the two facing line ends, if the spacing is end-to-end.
    pub heights: Option<(f64, f64)>,
}

impl SpacingQuery {
    pub fn new(max_width: f64, min_width: f64) -> Self {
        Self {
            max_width,
            min_width,
            ..Default::default()
        }
    }

    pub fn with_run_length(mut self, run_length: f64) -> Self {
        self.run_length = Some(run_length);
        self
    }

    pub fn with_heights(mut self, first: f64, second: f64) -> Self {
        self.heights = Some((first, second));
        self
    }
}

/// Read-only rule accessor over a technology's [RuleTable].
#[derive(Debug, Clone, Copy)]
pub struct DesignRules<'a> {
    table: &'a RuleTable,
    grid: f64,
}

impl<'a> DesignRules<'a> {
    pub fn new(table: &'a RuleTable, grid: f64) -> Self {
        Self { table, grid }
    }

    pub fn table(&self) -> &'a RuleTable {
        self.table
    }

    pub fn grid(&self) -> f64 {
        self.grid
    }

    /// A rule that must exist; `layer` names the layer for diagnostics.
    pub fn require(&self, key: &str, layer: &str) -> RuleResult<f64> {
        self.table.get(key).ok_or_else(|| RuleError::MissingRule {
            key: key.to_string(),
            layer: layer.to_string(),
        })
    }

    fn require_pair(&self, key: &str, first: &str, second: &str) -> RuleResult<f64> {
        self.table
            .get(key)
            .ok_or_else(|| RuleError::MissingLayerPairRule {
                key: key.to_string(),
                first: first.to_string(),
                second: second.to_string(),
            })
    }

    /// Minimum width. Implant and well variants share one generic rule.
    pub fn min_width(&self, layer: &str) -> RuleResult<f64> {
        let stem = LayerClass::classify(layer).alias().unwrap_or(layer);
        self.require(&format!("minwidth_{stem}"), layer)
    }

    /// Generic spacing between two layers, in either key order.
    pub fn layer_spacing(&self, first: &str, second: &str) -> RuleResult<f64> {
        let forward = format!("{first}_to_{second}");
        let reverse = format!("{second}_to_{first}");
        self.table
            .get(&forward)
            .or_else(|| self.table.get(&reverse))
            .ok_or(RuleError::MissingLayerPairRule {
                key: forward,
                first: first.to_string(),
                second: second.to_string(),
            })
    }

    fn same_layer_spacing(&self, layer: &str) -> RuleResult<f64> {
        match self.layer_spacing(layer, layer) {
            Err(err) => match LayerClass::classify(layer).alias() {
                Some(alias) => self.layer_spacing(alias, alias).map_err(|_| err),
                None => Err(err),
            },
            found => found,
        }
    }

    /// Same-layer spacing for two shapes described by `query`.
    ///
    /// Checks thin-implant, line-end, wide and parallel-run classes in that
    /// order, and returns the largest of every class that applies and the
    /// generic spacing. A class whose threshold is not in the table never
    /// applies.
    pub fn spacing(&self, layer: &str, query: &SpacingQuery) -> RuleResult<f64> {
        let class = LayerClass::classify(layer);
        let mut spacing = self.same_layer_spacing(layer)?;

        if class == LayerClass::Implant {
            if let Some(threshold) = self.table.get(&format!("{layer}_thin_width")) {
                if query.min_width < threshold {
                    let rule = self.require_pair(&format!("thin_{layer}_to_{layer}"), layer, layer)?;
                    log::trace!("{layer}: thin implant spacing {rule}");
                    spacing = spacing.max(rule);
                }
            }
        }

        if class.is_metal() {
            if let (Some((h1, h2)), Some(threshold)) = (
                query.heights,
                self.table.get(&format!("{layer}_line_end_height")),
            ) {
                if h1.min(h2) < threshold {
                    let rule =
                        self.require_pair(&format!("line_end_{layer}_to_{layer}"), layer, layer)?;
                    log::trace!("{layer}: line-end spacing {rule}");
                    spacing = spacing.max(rule);
                }
            }
        }

        for class_name in ["wide", "parallel"] {
            if let Some(rule) = self.width_class_spacing(class_name, layer, query)? {
                log::trace!("{layer}: {class_name} spacing {rule}");
                spacing = spacing.max(rule);
            }
        }

        Ok(spacing)
    }

    /// Spacing of a width-dependent class, if `query` falls in it.
    ///
    /// An unknown run length counts as long enough.
    fn width_class_spacing(
        &self,
        class_name: &str,
        layer: &str,
        query: &SpacingQuery,
    ) -> RuleResult<Option<f64>> {
        let Some(width) = self.table.get(&format!("{class_name}_{layer}_width")) else {
            return Ok(None);
        };
        if query.max_width <= width {
            return Ok(None);
        }
        let long_enough = match (
            query.run_length,
            self.table.get(&format!("{class_name}_{layer}_length")),
        ) {
            (Some(run), Some(length)) => run > length,
            _ => true,
        };
        if !long_enough {
            return Ok(None);
        }
        self.require_pair(&format!("{class_name}_{layer}_to_{layer}"), layer, layer)
            .map(Some)
    }

    /// Resolve `<prefix>_<layer>`, stepping down through lower metals.
    ///
    /// For `metalN` the keys tried are `<prefix>_metalN`, `<prefix>_metal(N-1)`,
    /// ..., `<prefix>_metal1`, then the bare `<prefix>`. Other layers try
    /// `<prefix>_<layer>` then `<prefix>`.
    pub fn rule_by_layer(&self, layer: &str, prefix: &str) -> RuleResult<f64> {
        let candidates: Vec<String> = match LayerClass::classify(layer) {
            LayerClass::Metal(n) => (1..=n).rev().map(|k| format!("{prefix}_metal{k}")).collect(),
            _ => vec![format!("{prefix}_{layer}")],
        };
        for key in &candidates {
            if let Some(value) = self.table.get(key) {
                log::trace!("{layer}: resolved {prefix} via '{key}'");
                return Ok(value);
            }
        }
        self.require(prefix, layer)
    }

    /// Minimum area, with the same fallback as [DesignRules::rule_by_layer].
    pub fn min_area(&self, layer: &str, prefix: Option<&str>) -> RuleResult<f64> {
        self.rule_by_layer(layer, &format!("{}minarea", prefix.unwrap_or("")))
    }

    /// Smallest side a shape on `layer` may have; defaults to the minimum width.
    pub fn min_side(&self, layer: &str) -> RuleResult<f64> {
        match self.table.get(&format!("minside_{layer}")) {
            Some(side) => Ok(side),
            None => self.min_width(layer),
        }
    }

    /// `(width, height)` of a shape meeting the minimum area at `width`
    /// (the layer's minimum width if not given).
    pub fn min_area_height(&self, layer: &str, width: Option<f64>) -> RuleResult<(f64, f64)> {
        let width = match width {
            Some(w) if w > 0.0 => w,
            _ => self.min_width(layer)?,
        };
        let height = self.area_side(layer, width)?;
        Ok((width, height))
    }

    /// `(width, height)` of a shape meeting the minimum area at `height`
    /// (the layer's minimum width if not given).
    pub fn min_area_width(&self, layer: &str, height: Option<f64>) -> RuleResult<(f64, f64)> {
        let height = match height {
            Some(h) if h > 0.0 => h,
            _ => self.min_width(layer)?,
        };
        let width = self.area_side(layer, height)?;
        Ok((width, height))
    }

    fn area_side(&self, layer: &str, fixed: f64) -> RuleResult<f64> {
        let area = self.min_area(layer, None)?;
        let side = ceil_to_grid(area / fixed, self.grid);
        Ok(side.max(self.min_side(layer)?))
    }

    /// How far `outer` must extend past `inner` on every side.
    pub fn enclosure(&self, outer: &str, inner: &str) -> RuleResult<f64> {
        self.require_pair(&format!("{outer}_enclosure_{inner}"), outer, inner)
    }

    /// How far `outer` must extend past the ends of `inner`; falls back to
    /// the enclosure when no separate extension rule exists.
    pub fn extension(&self, outer: &str, inner: &str) -> RuleResult<f64> {
        match self.table.get(&format!("{outer}_extend_{inner}")) {
            Some(extend) => Ok(extend),
            None => self.enclosure(outer, inner),
        }
    }

    pub fn implant_enclosure(&self, layer: &str) -> RuleResult<f64> {
        self.require_pair(&format!("implant_enclosure_{layer}"), "implant", layer)
    }

    pub fn well_enclosure(&self, layer: &str) -> RuleResult<f64> {
        self.require_pair(&format!("well_enclosure_{layer}"), "well", layer)
    }
}
