use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::database::{Library, ModuleKey};
use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{snap_to_grid, BBox, Label, Point, Rect, Shape, GRID_TOLERANCE};
use crate::layer::Layer;
use crate::spatial::BlockageIndex;
use crate::transform::{Mirror, Rotation, Transform, Transformable};

/// Capabilities shared by every module produced by one generator.
///
/// The kind decides whether two modules may carry the same name, whether
/// pins are written to the output, and which pins never become blockages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleKind {
    pub name: String,
    shares_name: bool,
    library_cell: bool,
    blockage_pin_exclusions: BTreeSet<String>,
}

impl ModuleKind {
    /// An ordinary generated module with a process-unique name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shares_name: false,
            library_cell: false,
            blockage_pin_exclusions: BTreeSet::new(),
        }
    }

    /// Contacts are rebuilt from identical parameters by many generators.
    pub fn contact() -> Self {
        Self::new("contact").sharing_names()
    }

    /// A pre-drawn cell read from a foundry or user library. Its pins are
    /// part of the imported data and are not written again.
    pub fn library_cell(name: &str) -> Self {
        Self {
            library_cell: true,
            ..Self::new(name)
        }
    }

    pub fn sharing_names(mut self) -> Self {
        self.shares_name = true;
        self
    }

    /// Declare pins that never act as blockages in a parent.
    pub fn excluding_blockage_pins<I, S>(mut self, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blockage_pin_exclusions
            .extend(pins.into_iter().map(|p| p.as_ref().to_lowercase()));
        self
    }

    pub fn shares_name(&self) -> bool {
        self.shares_name
    }

    pub fn is_library_cell(&self) -> bool {
        self.library_cell
    }

    pub fn excludes_blockage_pin(&self, pin: &str) -> bool {
        self.blockage_pin_exclusions.contains(pin)
    }
}

/// A named terminal rectangle. Multi-layer pins are stored as several
/// entries under one name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub rect: Rect,
}

impl Pin {
    pub fn new(name: &str, rect: Rect) -> Self {
        Self {
            name: name.to_lowercase(),
            rect,
        }
    }

    pub fn bbox(&self) -> BBox {
        self.rect.bbox()
    }

    pub fn center(&self) -> Point {
        self.rect.center()
    }

    pub fn is_on(&self, layer: &Layer) -> bool {
        self.rect.is_on(layer)
    }
}

impl Transformable for Pin {
    fn transformed(&self, trans: &Transform) -> Self {
        Self {
            name: self.name.clone(),
            rect: self.rect.transformed(trans),
        }
    }
}

/// A placement of a shared module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    name: String,
    module: ModuleKey,
    transform: Transform,
    boundary: BBox,
}

impl Instance {
    fn new(name: &str, module: ModuleKey, definition: &Module, transform: Transform) -> Self {
        let local = BBox::from_size(Point::zero(), definition.width, definition.height);
        Self {
            name: name.to_string(),
            module,
            transform,
            boundary: transform.apply_box(&local),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> ModuleKey {
        self.module
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn offset(&self) -> Point {
        self.transform.offset
    }

    pub fn mirror(&self) -> Mirror {
        self.transform.mirror
    }

    pub fn rotation(&self) -> Rotation {
        self.transform.rotation
    }

    /// Absolute boundary in the parent frame, fixed at placement time.
    pub fn boundary(&self) -> BBox {
        self.boundary
    }

    /// All pins named `name`, in the parent frame.
    pub fn get_pins(&self, lib: &Library, name: &str) -> LayoutResult<Vec<Pin>> {
        let module = lib.module(self.module)?;
        Ok(module
            .get_pins(name)?
            .iter()
            .map(|p| p.transformed(&self.transform))
            .collect())
    }

    /// The first pin named `name`, in the parent frame.
    pub fn get_pin(&self, lib: &Library, name: &str) -> LayoutResult<Pin> {
        let module = lib.module(self.module)?;
        Ok(module.get_pin(name)?.transformed(&self.transform))
    }

    pub fn get_pin_at(&self, lib: &Library, name: &str, index: usize) -> LayoutResult<Pin> {
        let module = lib.module(self.module)?;
        let pins = module.get_pins(name)?;
        pins.get(index)
            .map(|p| p.transformed(&self.transform))
            .ok_or_else(|| LayoutError::PinIndexOutOfRange {
                module: module.name.clone(),
                pin: name.to_lowercase(),
                index,
            })
    }

    /// Shapes of the placed module on `layer`, in the parent frame.
    pub fn get_layer_shapes(
        &self,
        lib: &Library,
        layer: &Layer,
        recursive: bool,
    ) -> LayoutResult<Vec<Rect>> {
        let module = lib.module(self.module)?;
        Ok(module
            .get_layer_shapes(lib, layer, recursive)?
            .iter()
            .map(|r| r.transformed(&self.transform))
            .collect())
    }

    fn translate(&mut self, delta: Point) {
        self.transform.offset = self.transform.offset + delta;
        self.boundary = self.boundary.translate(delta);
    }
}

/// Tagged view over everything a module can hold.
#[derive(Debug, Clone, Copy)]
pub enum Placeable<'a> {
    Instance(&'a Instance),
    Rect(&'a Rect),
    Label(&'a Label),
    Pin(&'a Pin),
}

impl Placeable<'_> {
    pub fn bbox(&self) -> BBox {
        match self {
            Placeable::Instance(i) => i.boundary(),
            Placeable::Rect(r) => r.bbox(),
            Placeable::Label(l) => BBox::new(l.position, l.position),
            Placeable::Pin(p) => p.bbox(),
        }
    }

    /// Annotations carry no physical extent.
    pub fn is_annotation(&self) -> bool {
        matches!(self, Placeable::Label(_))
    }
}

/// A hierarchical layout cell.
///
/// A module is built by its generator, then handed to [Library::add_module],
/// after which it is only reachable through shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    name: String,
    kind: ModuleKind,
    grid: f64,
    width: f64,
    height: f64,
    shapes: Vec<Shape>,
    instances: Vec<Instance>,
    pins: IndexMap<String, Vec<Pin>>,
}

impl Module {
    pub fn new(name: &str, kind: ModuleKind, grid: f64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            grid,
            width: 0.0,
            height: 0.0,
            shapes: Vec::new(),
            instances: Vec::new(),
            pins: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    pub fn grid(&self) -> f64 {
        self.grid
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    /// Size the module to the upper-right corner of its geometry.
    pub fn size_to_fit(&mut self) {
        if let Some(extent) = self.find_extreme_coordinates() {
            self.set_size(extent.max.x, extent.max.y);
        }
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Add a rectangle with lower-left corner `offset`.
    ///
    /// Nothing is added on an absent layer or when either side snaps to zero.
    pub fn add_rect(&mut self, layer: &Layer, offset: Point, width: f64, height: f64) -> Option<&Rect> {
        let width = snap_to_grid(width, self.grid);
        let height = snap_to_grid(height, self.grid);
        if width.abs() < GRID_TOLERANCE || height.abs() < GRID_TOLERANCE {
            log::trace!("{}: skipping degenerate {} rect", self.name, layer.name);
            return None;
        }
        let rect = Rect::on_layer(layer, offset.snap_to_grid(self.grid), width, height)?;
        self.shapes.push(Shape::Rect(rect));
        self.shapes.last().and_then(Shape::as_rect)
    }

    pub fn add_rect_center(&mut self, layer: &Layer, center: Point, width: f64, height: f64) -> Option<&Rect> {
        let offset = center.translate(-width / 2.0, -height / 2.0);
        self.add_rect(layer, offset, width, height)
    }

    pub fn add_label(&mut self, text: &str, layer: &Layer, position: Point) -> Option<&Label> {
        let label = Label::on_layer(text, layer, position.snap_to_grid(self.grid))?;
        self.shapes.push(Shape::Label(label));
        match self.shapes.last() {
            Some(Shape::Label(l)) => Some(l),
            _ => None,
        }
    }

    /// Place `module` in this module. The placed module is referenced, not copied.
    pub fn add_instance(
        &mut self,
        lib: &Library,
        name: &str,
        module: ModuleKey,
        offset: Point,
        mirror: Mirror,
        rotation: Rotation,
    ) -> LayoutResult<&Instance> {
        if self.instance(name).is_some() {
            return Err(LayoutError::DuplicateInstanceName {
                module: self.name.clone(),
                instance: name.to_string(),
            });
        }
        let definition = lib.module(module)?;
        let transform = Transform::new(offset, mirror, rotation);
        let instance = Instance::new(name, module, definition, transform);
        log::debug!(
            "{}: placed {} ({}) at ({}, {}) {} {}",
            self.name,
            name,
            definition.name,
            offset.x,
            offset.y,
            mirror,
            rotation
        );
        self.instances.push(instance);
        Ok(&self.instances[self.instances.len() - 1])
    }

    fn insert_pin(&mut self, pin: Pin) -> &Pin {
        let entries = self.pins.entry(pin.name.clone()).or_default();
        let index = match entries.iter().position(|p| *p == pin) {
            Some(existing) => {
                log::trace!("{}: merged duplicate pin '{}'", self.name, pin.name);
                existing
            }
            None => {
                entries.push(pin);
                entries.len() - 1
            }
        };
        &entries[index]
    }

    /// Add a pin spanning two opposite corners, given in any order.
    pub fn add_pin(&mut self, name: &str, layer: &Layer, a: Point, b: Point) -> Option<&Pin> {
        let (number, purpose) = layer.id()?;
        let bbox = BBox::new(a.snap_to_grid(self.grid), b.snap_to_grid(self.grid));
        Some(self.insert_pin(Pin::new(name, Rect::from_bbox(number, purpose, bbox))))
    }

    pub fn add_pin_center(
        &mut self,
        name: &str,
        layer: &Layer,
        center: Point,
        width: f64,
        height: f64,
    ) -> Option<&Pin> {
        let half = Point::new(width / 2.0, height / 2.0);
        self.add_pin(name, layer, center - half, center + half)
    }

    /// Add a pin drawn along a horizontal or vertical centerline.
    ///
    /// `width` is the extent across the segment; a segment shorter than
    /// `width` is stretched to it.
    pub fn add_pin_segment(
        &mut self,
        name: &str,
        layer: &Layer,
        start: Point,
        end: Point,
        width: f64,
    ) -> LayoutResult<Option<&Pin>> {
        let dx = (end.x - start.x).abs();
        let dy = (end.y - start.y).abs();
        if dx > GRID_TOLERANCE && dy > GRID_TOLERANCE {
            return Err(LayoutError::NonManhattanPin {
                pin: name.to_string(),
                x0: start.x,
                y0: start.y,
                x1: end.x,
                y1: end.y,
            });
        }
        let mut lower_left = start.min(&end);
        if dy <= GRID_TOLERANCE {
            lower_left.y -= width / 2.0;
        }
        if dx <= GRID_TOLERANCE {
            lower_left.x -= width / 2.0;
        }
        let upper_right = lower_left.translate(dx.max(width), dy.max(width));
        Ok(self.add_pin(name, layer, lower_left, upper_right))
    }

    /// Copy the pins `pin` of instance `instance` into this module, in this
    /// module's frame. Returns the number of pin shapes copied.
    pub fn copy_pin(
        &mut self,
        lib: &Library,
        instance: &str,
        pin: &str,
        new_name: Option<&str>,
    ) -> LayoutResult<usize> {
        let inst = self
            .instance(instance)
            .ok_or_else(|| LayoutError::PinNotFound {
                module: self.name.clone(),
                pin: format!("{instance}/{pin}"),
            })?;
        let pins = inst.get_pins(lib, pin)?;
        let name = new_name.unwrap_or(pin);
        for p in &pins {
            self.insert_pin(Pin::new(name, p.rect.clone()));
        }
        Ok(pins.len())
    }

    pub fn has_pin(&self, name: &str) -> bool {
        self.pins.contains_key(&name.to_lowercase())
    }

    /// The first pin named `name`.
    pub fn get_pin(&self, name: &str) -> LayoutResult<&Pin> {
        let pins = self.get_pins(name)?;
        if pins.len() > 1 {
            log::warn!(
                "{}: {} pins named '{}', using the first",
                self.name,
                pins.len(),
                name
            );
        }
        pins.first().ok_or_else(|| self.missing_pin(name))
    }

    pub fn get_pins(&self, name: &str) -> LayoutResult<&[Pin]> {
        self.pins
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .ok_or_else(|| self.missing_pin(name))
    }

    fn missing_pin(&self, name: &str) -> LayoutError {
        LayoutError::PinNotFound {
            module: self.name.clone(),
            pin: name.to_lowercase(),
        }
    }

    pub fn pin_names(&self) -> impl Iterator<Item = &str> {
        self.pins.keys().map(String::as_str)
    }

    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values().flatten()
    }

    pub fn placeables(&self) -> impl Iterator<Item = Placeable<'_>> {
        let shapes = self.shapes.iter().map(|s| match s {
            Shape::Rect(r) => Placeable::Rect(r),
            Shape::Label(l) => Placeable::Label(l),
        });
        let instances = self.instances.iter().map(Placeable::Instance);
        shapes.chain(instances).chain(self.pins().map(Placeable::Pin))
    }

    /// Bounding box of shapes, pins and placed instances. Labels are ignored.
    pub fn find_extreme_coordinates(&self) -> Option<BBox> {
        self.placeables()
            .filter(|p| !p.is_annotation())
            .map(|p| p.bbox())
            .reduce(|a, b| a.union(&b))
    }

    /// Translate everything so the lower-left corner of the geometry sits at
    /// the origin. Returns the translation that was applied.
    pub fn offset_all_coordinates(&mut self) -> Point {
        let Some(extent) = self.find_extreme_coordinates() else {
            return Point::zero();
        };
        let delta = -extent.min;
        if delta.approx_eq(&Point::zero(), GRID_TOLERANCE) {
            return Point::zero();
        }
        for shape in &mut self.shapes {
            let moved = match &*shape {
                Shape::Rect(r) => Shape::Rect(r.translated(delta)),
                Shape::Label(l) => Shape::Label(l.translated(delta)),
            };
            *shape = moved;
        }
        for instance in &mut self.instances {
            instance.translate(delta);
        }
        for pin in self.pins.values_mut().flatten() {
            *pin = pin.translated(delta);
        }
        log::debug!("{}: offset all coordinates by ({}, {})", self.name, delta.x, delta.y);
        delta
    }

    /// Rectangles on `layer`; with `recursive`, also those of every placed
    /// module, moved into this module's frame.
    pub fn get_layer_shapes(
        &self,
        lib: &Library,
        layer: &Layer,
        recursive: bool,
    ) -> LayoutResult<Vec<Rect>> {
        let mut found = Vec::new();
        if recursive {
            for instance in &self.instances {
                found.extend(instance.get_layer_shapes(lib, layer, true)?);
            }
        }
        found.extend(
            self.shapes
                .iter()
                .filter_map(Shape::as_rect)
                .filter(|r| r.is_on(layer))
                .cloned(),
        );
        Ok(found)
    }

    /// Obstructions on `layer` as seen by something routed in this module.
    ///
    /// Pins of placed modules count as obstructions, except those their kind
    /// declares excluded. This module's own pins do not.
    pub fn get_blockages(&self, lib: &Library, layer: &Layer) -> LayoutResult<Vec<BBox>> {
        self.collect_blockages(lib, layer, true)
    }

    fn collect_blockages(&self, lib: &Library, layer: &Layer, top_level: bool) -> LayoutResult<Vec<BBox>> {
        let mut blockages = Vec::new();
        for instance in &self.instances {
            let child = lib.module(instance.module)?;
            blockages.extend(
                child
                    .collect_blockages(lib, layer, false)?
                    .iter()
                    .map(|b| instance.transform.apply_box(b)),
            );
        }
        blockages.extend(
            self.shapes
                .iter()
                .filter_map(Shape::as_rect)
                .filter(|r| r.is_on(layer))
                .map(Rect::bbox),
        );
        if !top_level {
            blockages.extend(
                self.pins()
                    .filter(|p| p.is_on(layer) && !self.kind.excludes_blockage_pin(&p.name))
                    .map(Pin::bbox),
            );
        }
        Ok(blockages)
    }

    /// R-tree over [Module::get_blockages] for region queries.
    pub fn blockage_index(&self, lib: &Library, layer: &Layer) -> LayoutResult<BlockageIndex> {
        Ok(BlockageIndex::build(self.get_blockages(lib, layer)?))
    }
}
