//! Rule-driven contact and via generation.
//!
//! A contact is a rectangular array of cuts between a bottom and a top
//! conductor. Its geometry depends only on the [ContactParams], so each
//! distinct parameter set becomes one shared module.

use std::fmt;

use cellweave_core::geometry::ceil_to_grid;
use cellweave_core::{BBox, Layer, Library, Module, ModuleKey, ModuleKind, Point};
use cellweave_rules::{DesignRules, SpacingQuery, ViaStack};
use serde::{Deserialize, Serialize};

use crate::error::{ContactError, ContactResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactStyle {
    /// Both conductors extend along the same axis.
    #[default]
    Aligned,
    /// The top conductor runs perpendicular to the bottom one.
    Cross,
}

/// Everything that determines a contact's geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactParams {
    pub bottom: String,
    pub cut: String,
    pub top: String,
    pub count_x: u32,
    pub count_y: u32,
    pub implant: Option<String>,
    pub well: Option<String>,
    pub area_fill: bool,
    pub style: ContactStyle,
}

impl ContactParams {
    /// A single-cut aligned contact.
    pub fn new(bottom: &str, cut: &str, top: &str) -> Self {
        Self {
            bottom: bottom.to_string(),
            cut: cut.to_string(),
            top: top.to_string(),
            count_x: 1,
            count_y: 1,
            implant: None,
            well: None,
            area_fill: false,
            style: ContactStyle::Aligned,
        }
    }

    pub fn from_stack(stack: &ViaStack) -> Self {
        Self::new(&stack.bottom, &stack.cut, &stack.top)
    }

    pub fn array(mut self, count_x: u32, count_y: u32) -> Self {
        self.count_x = count_x;
        self.count_y = count_y;
        self
    }

    pub fn with_implant_well(mut self, implant: &str, well: &str) -> Self {
        self.implant = Some(implant.to_string());
        self.well = Some(well.to_string());
        self
    }

    pub fn with_area_fill(mut self) -> Self {
        self.area_fill = true;
        self
    }

    pub fn with_style(mut self, style: ContactStyle) -> Self {
        self.style = style;
        self
    }

    /// Module name for these parameters.
    pub fn name(&self) -> String {
        self.to_string()
    }

    fn validate(&self) -> ContactResult<()> {
        if self.count_x == 0 || self.count_y == 0 {
            return Err(ContactError::InvalidArray {
                count_x: self.count_x,
                count_y: self.count_y,
            });
        }
        if self.implant.is_some() != self.well.is_some() {
            return Err(ContactError::PartialImplantWell {
                name: self.name(),
                implant: self.implant.clone(),
                well: self.well.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContactParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "contact_{}_{}_{}_{}x{}",
            self.bottom, self.cut, self.top, self.count_x, self.count_y
        )?;
        if let (Some(implant), Some(well)) = (&self.implant, &self.well) {
            write!(f, "_{implant}_{well}")?;
        }
        if self.area_fill {
            write!(f, "_fill")?;
        }
        if self.style == ContactStyle::Cross {
            write!(f, "_cross")?;
        }
        Ok(())
    }
}

/// Margin of a conductor around the cut array, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enclosure {
    pub horizontal: f64,
    pub vertical: f64,
}

/// Resolved dimensions of a contact, in the contact's own frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactGeometry {
    pub count_x: u32,
    pub count_y: u32,
    /// Side of one cut.
    pub cut_width: f64,
    /// Center-to-center distance between neighbouring cuts.
    pub pitch: f64,
    /// Extent of the whole cut array.
    pub footprint: Point,
    pub bottom: Enclosure,
    pub top: Enclosure,
    /// Lower-left corner of the first cut.
    pub cut_origin: Point,
    pub style: ContactStyle,
}

impl ContactGeometry {
    pub fn resolve(rules: &DesignRules<'_>, params: &ContactParams) -> ContactResult<Self> {
        params.validate()?;
        let grid = rules.grid();

        let cut_width = rules.min_width(&params.cut)?;
        let cut_spacing = rules.spacing(&params.cut, &SpacingQuery::new(cut_width, cut_width))?;
        let pitch = cut_width + cut_spacing;
        let footprint = Point::new(
            cut_width + f64::from(params.count_x - 1) * pitch,
            cut_width + f64::from(params.count_y - 1) * pitch,
        );

        let mut bottom = conductor_enclosure(rules, &params.bottom, &params.cut, footprint, false)?;
        let mut top = conductor_enclosure(
            rules,
            &params.top,
            &params.cut,
            footprint,
            params.style == ContactStyle::Cross,
        )?;

        if params.area_fill {
            for (layer, enclosure) in [(&params.bottom, &mut bottom), (&params.top, &mut top)] {
                let width = footprint.x + 2.0 * enclosure.horizontal;
                let min_area = rules.min_area(layer, None)?;
                let margin = ceil_to_grid((min_area / width - footprint.y) / 2.0, grid);
                if margin > enclosure.vertical {
                    log::debug!(
                        "{}: {layer} vertical enclosure raised {} -> {margin} for min area {min_area}",
                        params,
                        enclosure.vertical
                    );
                    enclosure.vertical = margin;
                }
            }
        }

        let cut_origin = Point::new(
            bottom.horizontal.max(top.horizontal),
            bottom.vertical.max(top.vertical),
        );

        Ok(Self {
            count_x: params.count_x,
            count_y: params.count_y,
            cut_width,
            pitch,
            footprint,
            bottom,
            top,
            cut_origin,
            style: params.style,
        })
    }

    /// Bounding box of the whole cut array.
    pub fn cut_array(&self) -> BBox {
        BBox::from_size(self.cut_origin, self.footprint.x, self.footprint.y)
    }

    pub fn cuts(&self) -> Vec<BBox> {
        let mut cuts = Vec::with_capacity((self.count_x * self.count_y) as usize);
        for ix in 0..self.count_x {
            for iy in 0..self.count_y {
                let offset = self.cut_origin.translate(
                    f64::from(ix) * self.pitch,
                    f64::from(iy) * self.pitch,
                );
                cuts.push(BBox::from_size(offset, self.cut_width, self.cut_width));
            }
        }
        cuts
    }

    fn conductor_size(&self, enclosure: &Enclosure) -> (f64, f64) {
        (
            self.footprint.x + 2.0 * enclosure.horizontal,
            self.footprint.y + 2.0 * enclosure.vertical,
        )
    }

    /// Offset of a conductor relative to the cut origin's frame: each axis
    /// absorbs the other conductor's larger margin.
    fn aligned_box(&self, own: &Enclosure, other: &Enclosure) -> BBox {
        let offset = Point::new(
            (other.horizontal - own.horizontal).max(0.0),
            (other.vertical - own.vertical).max(0.0),
        );
        let (width, height) = self.conductor_size(own);
        BBox::from_size(offset, width, height)
    }

    pub fn bottom_box(&self) -> BBox {
        self.aligned_box(&self.bottom, &self.top)
    }

    pub fn top_box(&self) -> BBox {
        match self.style {
            ContactStyle::Aligned => self.aligned_box(&self.top, &self.bottom),
            ContactStyle::Cross => {
                let (width, height) = self.conductor_size(&self.top);
                let center = self.bottom_box().center();
                BBox::from_size(center.translate(-width / 2.0, -height / 2.0), width, height)
            }
        }
    }

    /// Overall extent of the conductors and cuts.
    pub fn extent(&self) -> BBox {
        self.cuts()
            .iter()
            .fold(self.bottom_box().union(&self.top_box()), |acc, cut| acc.union(cut))
    }
}

fn conductor_enclosure(
    rules: &DesignRules<'_>,
    conductor: &str,
    cut: &str,
    footprint: Point,
    swap_axes: bool,
) -> ContactResult<Enclosure> {
    let grid = rules.grid();
    let min_width = rules.min_width(conductor)?;
    let enclosure = rules.enclosure(conductor, cut)?;
    let extension = rules.extension(conductor, cut)?;
    let (horizontal_rule, vertical_rule) = if swap_axes {
        (extension, enclosure)
    } else {
        (enclosure, extension)
    };
    let horizontal = ((min_width - footprint.x) / 2.0).max(horizontal_rule);
    let vertical = ((min_width - footprint.y) / 2.0).max(vertical_rule);
    Ok(Enclosure {
        horizontal: ceil_to_grid(horizontal, grid),
        vertical: ceil_to_grid(vertical, grid),
    })
}

/// Build the contact module for `params` and add it to `lib`.
///
/// Contacts share names, so building the same parameters twice yields the
/// same key.
pub fn build_contact(
    lib: &mut Library,
    rules: &DesignRules<'_>,
    params: &ContactParams,
) -> ContactResult<ModuleKey> {
    let geometry = ContactGeometry::resolve(rules, params)?;
    let name = params.name();
    let mut module = lib.new_module(&name, ModuleKind::contact());

    let bottom = lib.layer(&params.bottom)?;
    let cut = lib.layer(&params.cut)?;
    let top = lib.layer(&params.top)?;

    let bottom_box = geometry.bottom_box();
    add_box(&mut module, &bottom, &bottom_box);
    add_box(&mut module, &top, &geometry.top_box());
    for cut_box in geometry.cuts() {
        add_box(&mut module, &cut, &cut_box);
    }

    let mut extent = geometry.extent();
    let mut bottom_box = bottom_box;
    if params.style == ContactStyle::Cross {
        let shift = module.offset_all_coordinates();
        extent = extent.translate(shift);
        bottom_box = bottom_box.translate(shift);
    }
    module.set_size(extent.max.x, extent.max.y);

    if let (Some(implant), Some(well)) = (&params.implant, &params.well) {
        add_implant_well(lib, rules, &mut module, params, implant, well, &bottom_box)?;
    }

    log::debug!(
        "{}: pitch {} footprint {}x{} size {}x{}",
        name,
        geometry.pitch,
        geometry.footprint.x,
        geometry.footprint.y,
        module.width(),
        module.height()
    );
    Ok(lib.add_module(module)?)
}

fn add_box(module: &mut Module, layer: &Layer, bbox: &BBox) {
    module.add_rect(layer, bbox.min, bbox.width(), bbox.height());
}

/// Implant centered on the bottom conductor and well around it. Neither
/// changes the contact's size.
fn add_implant_well(
    lib: &Library,
    rules: &DesignRules<'_>,
    module: &mut Module,
    params: &ContactParams,
    implant: &str,
    well: &str,
    bottom_box: &BBox,
) -> ContactResult<()> {
    let implant_layer = lib.layer(implant)?;
    if implant_layer.is_present() {
        let margin = rules.implant_enclosure(&params.bottom)?;
        let min_width = rules.min_width(implant)?;
        let width = (bottom_box.width() + 2.0 * margin).max(min_width);
        let height = (bottom_box.height() + 2.0 * margin).max(min_width);
        module.add_rect_center(&implant_layer, bottom_box.center(), width, height);
    }

    let well_layer = lib.layer(well)?;
    if well_layer.is_present() {
        let margin = rules.well_enclosure(&params.bottom)?;
        add_box(module, &well_layer, &bottom_box.expand(margin));
    } else {
        log::trace!("{}: no '{well}' layer in this technology", params);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellweave_core::{LayerTable, Rect, Shape};
    use cellweave_rules::RuleTable;

    const EPS: f64 = 1e-6;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn layers() -> LayerTable {
        LayerTable::new()
            .with_layer("active", 65, 20)
            .with_layer("contact", 66, 44)
            .with_layer("metal1", 68, 20)
            .with_layer("via1", 68, 44)
            .with_layer("metal2", 69, 20)
            .with_layer("nimplant", 93, 44)
            .with_layer("pwell", -1, -1)
            .with_layer("nwell", 64, 20)
    }

    fn table() -> RuleTable {
        RuleTable::new()
            .with_rule("minwidth_metal1", 0.14)
            .with_rule("minwidth_metal2", 0.14)
            .with_rule("minwidth_via1", 0.2)
            .with_rule("via1_to_via1", 0.2)
            .with_rule("metal1_enclosure_via1", 0.06)
            .with_rule("metal2_enclosure_via1", 0.08)
            .with_rule("metal2_extend_via1", 0.1)
            .with_rule("minarea_metal1", 0.2)
            .with_rule("minwidth_active", 0.15)
            .with_rule("minwidth_contact", 0.17)
            .with_rule("contact_to_contact", 0.17)
            .with_rule("active_enclosure_contact", 0.01)
            .with_rule("metal1_enclosure_contact", 0.03)
            .with_rule("metal1_extend_contact", 0.06)
            .with_rule("minwidth_implant", 0.38)
            .with_rule("implant_enclosure_active", 0.125)
            .with_rule("well_enclosure_active", 0.18)
    }

    fn rects_on<'a>(lib: &'a Library, key: ModuleKey, layer: &str) -> Vec<&'a Rect> {
        let layer = lib.layer(layer).unwrap();
        lib.module(key)
            .unwrap()
            .shapes()
            .iter()
            .filter_map(Shape::as_rect)
            .filter(|r| r.is_on(&layer))
            .collect()
    }

    fn assert_encloses(outer: &BBox, inner: &BBox, horizontal: f64, vertical: f64) {
        assert!(inner.min.x - outer.min.x >= horizontal - EPS, "left {outer:?} {inner:?}");
        assert!(outer.max.x - inner.max.x >= horizontal - EPS, "right {outer:?} {inner:?}");
        assert!(inner.min.y - outer.min.y >= vertical - EPS, "bottom {outer:?} {inner:?}");
        assert!(outer.max.y - inner.max.y >= vertical - EPS, "top {outer:?} {inner:?}");
    }

    #[test]
    fn test_metal1_via1_metal2_column() {
        init_logging();
        let table = RuleTable::new()
            .with_rule("minwidth_metal1", 0.14)
            .with_rule("minwidth_metal2", 0.14)
            .with_rule("minwidth_via1", 0.2)
            .with_rule("via1_to_via1", 0.2)
            .with_rule("metal1_enclosure_via1", 0.06)
            .with_rule("metal2_enclosure_via1", 0.08);
        let rules = DesignRules::new(&table, 0.005);
        let params = ContactParams::new("metal1", "via1", "metal2").array(1, 2);

        let geometry = ContactGeometry::resolve(&rules, &params).unwrap();
        assert!((geometry.pitch - 0.4).abs() < EPS);
        assert!(geometry.footprint.approx_eq(&Point::new(0.2, 0.6), EPS));
        assert!((geometry.bottom.horizontal - 0.06).abs() < EPS);
        assert!((geometry.bottom.vertical - 0.06).abs() < EPS);
        assert!((geometry.top.horizontal - 0.08).abs() < EPS);
        assert!((geometry.top.vertical - 0.08).abs() < EPS);
        assert!(geometry.cut_origin.approx_eq(&Point::new(0.08, 0.08), EPS));
        assert!(geometry
            .cut_array()
            .approx_eq(&BBox::new(Point::new(0.08, 0.08), Point::new(0.28, 0.68)), EPS));

        let mut lib = Library::new("contacts", layers(), 0.005);
        let key = build_contact(&mut lib, &rules, &params).unwrap();
        let module = lib.module(key).unwrap();
        assert_eq!(module.name(), "contact_metal1_via1_metal2_1x2");
        assert!((module.width() - 0.36).abs() < EPS);
        assert!((module.height() - 0.76).abs() < EPS);

        let m1 = rects_on(&lib, key, "metal1");
        assert_eq!(m1.len(), 1);
        assert!(m1[0].offset().approx_eq(&Point::new(0.02, 0.02), EPS));
        assert!((m1[0].width() - 0.32).abs() < EPS);
        assert!((m1[0].height() - 0.72).abs() < EPS);

        let m2 = rects_on(&lib, key, "metal2");
        assert!(m2[0].offset().approx_eq(&Point::zero(), EPS));
        assert!((m2[0].width() - 0.36).abs() < EPS);
        assert!((m2[0].height() - 0.76).abs() < EPS);

        let cuts = rects_on(&lib, key, "via1");
        assert_eq!(cuts.len(), 2);
        assert!(cuts[1].offset().approx_eq(&Point::new(0.08, 0.48), EPS));
    }

    #[test]
    fn test_enclosure_on_every_side() {
        let table = table();
        let rules = DesignRules::new(&table, 0.005);
        for style in [ContactStyle::Aligned, ContactStyle::Cross] {
            for (nx, ny) in [(1, 1), (2, 1), (3, 2)] {
                let mut lib = Library::new("contacts", layers(), 0.005);
                let params = ContactParams::new("metal1", "via1", "metal2")
                    .array(nx, ny)
                    .with_style(style);
                let key = build_contact(&mut lib, &rules, &params).unwrap();

                let cut_boxes: Vec<BBox> =
                    rects_on(&lib, key, "via1").iter().map(|r| r.bbox()).collect();
                assert_eq!(cut_boxes.len(), (nx * ny) as usize);
                let array = cut_boxes[1..]
                    .iter()
                    .fold(cut_boxes[0], |acc, b| acc.union(b));

                let m1 = rects_on(&lib, key, "metal1")[0].bbox();
                assert_encloses(&m1, &array, 0.06, 0.06);
                let m2 = rects_on(&lib, key, "metal2")[0].bbox();
                match style {
                    ContactStyle::Aligned => assert_encloses(&m2, &array, 0.08, 0.1),
                    ContactStyle::Cross => assert_encloses(&m2, &array, 0.1, 0.08),
                }

                let module = lib.module(key).unwrap();
                let extent = m1.union(&m2);
                assert!(extent.min.approx_eq(&Point::zero(), EPS));
                assert!((module.width() - extent.max.x).abs() < EPS);
                assert!((module.height() - extent.max.y).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_cross_swaps_top_axes() {
        let table = table();
        let rules = DesignRules::new(&table, 0.005);
        let params = ContactParams::new("metal1", "via1", "metal2").with_style(ContactStyle::Cross);
        let geometry = ContactGeometry::resolve(&rules, &params).unwrap();
        assert!((geometry.top.horizontal - 0.1).abs() < EPS);
        assert!((geometry.top.vertical - 0.08).abs() < EPS);
        assert!(geometry
            .top_box()
            .center()
            .approx_eq(&geometry.bottom_box().center(), EPS));
        assert!(params.name().ends_with("_cross"));
    }

    #[test]
    fn test_area_fill_meets_min_area() {
        let table = table();
        let rules = DesignRules::new(&table, 0.005);
        let mut lib = Library::new("contacts", layers(), 0.005);
        for style in [ContactStyle::Aligned, ContactStyle::Cross] {
            let params = ContactParams::new("metal1", "via1", "metal2")
                .with_area_fill()
                .with_style(style);
            let key = build_contact(&mut lib, &rules, &params).unwrap();
            // metal2 has no minarea of its own and steps down to metal1's.
            for layer in ["metal1", "metal2"] {
                let conductor = rects_on(&lib, key, layer)[0];
                assert!(
                    conductor.area() >= 0.2 - EPS,
                    "{style:?} {layer} area {}",
                    conductor.area()
                );
                let cut = rects_on(&lib, key, "via1")[0];
                assert_encloses(&conductor.bbox(), &cut.bbox(), 0.06, 0.06);
            }
        }
        let plain = ContactParams::new("metal1", "via1", "metal2").with_area_fill();
        assert_eq!(plain.name(), "contact_metal1_via1_metal2_1x1_fill");
        assert_eq!(
            plain.with_style(ContactStyle::Cross).name(),
            "contact_metal1_via1_metal2_1x1_fill_cross"
        );

        // Without a declared minimum area, filling cannot be resolved.
        let params = ContactParams::new("active", "contact", "metal1").with_area_fill();
        assert!(matches!(
            build_contact(&mut lib, &rules, &params),
            Err(ContactError::Rule(_))
        ));
    }

    #[test]
    fn test_implant_and_well() {
        let table = table();
        let rules = DesignRules::new(&table, 0.005);
        let mut lib = Library::new("contacts", layers(), 0.005);
        let params = ContactParams::new("active", "contact", "metal1").with_implant_well("nimplant", "nwell");
        let key = build_contact(&mut lib, &rules, &params).unwrap();

        let active = rects_on(&lib, key, "active")[0].bbox();
        let implant = rects_on(&lib, key, "nimplant")[0].bbox();
        let well = rects_on(&lib, key, "nwell")[0].bbox();
        assert!(implant.center().approx_eq(&active.center(), EPS));
        assert!(implant.width() >= 0.38 - EPS && implant.height() >= 0.38 - EPS);
        assert_encloses(&well, &active, 0.18, 0.18);

        // Implant and well lie outside the conductor extent and are not counted.
        let module = lib.module(key).unwrap();
        let conductors = active.union(&rects_on(&lib, key, "metal1")[0].bbox());
        assert!((module.width() - conductors.max.x).abs() < EPS);
        assert!(well.min.x < 0.0);

        // A technology without a physical p-well skips it silently.
        let params = ContactParams::new("active", "contact", "metal1").with_implant_well("nimplant", "pwell");
        let key = build_contact(&mut lib, &rules, &params).unwrap();
        assert_eq!(rects_on(&lib, key, "nimplant").len(), 1);
        assert!(lib.module(key).unwrap().name().ends_with("_nimplant_pwell"));
    }

    #[test]
    fn test_invalid_params() {
        let table = table();
        let rules = DesignRules::new(&table, 0.005);
        let mut params = ContactParams::new("active", "contact", "metal1");
        params.implant = Some("nimplant".into());
        assert!(matches!(
            ContactGeometry::resolve(&rules, &params),
            Err(ContactError::PartialImplantWell { .. })
        ));
        let params = ContactParams::new("metal1", "via1", "metal2").array(0, 2);
        assert!(matches!(
            ContactGeometry::resolve(&rules, &params),
            Err(ContactError::InvalidArray { count_x: 0, count_y: 2 })
        ));
    }
}
