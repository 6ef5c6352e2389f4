//! Hierarchical output traversal.
//!
//! [Library::emit] walks the module graph depth-first and hands every module
//! to a [LayoutSink] exactly once, children before the modules that place
//! them. Placements are per-instance, geometry is per-module.

use std::collections::HashSet;

use crate::cell::{Instance, Module, Pin};
use crate::database::{Library, ModuleKey};
use crate::error::LayoutError;
use crate::geometry::{Label, Rect, Shape};

/// Receiver of emitted layout data, e.g. a stream writer.
pub trait LayoutSink {
    type Error: From<LayoutError>;

    fn begin_module(&mut self, module: &Module) -> Result<(), Self::Error>;

    /// Emit a placement of `definition` inside the current module.
    fn emit_instance(&mut self, instance: &Instance, definition: &Module) -> Result<(), Self::Error>;

    fn emit_rect(&mut self, rect: &Rect) -> Result<(), Self::Error>;

    fn emit_label(&mut self, label: &Label) -> Result<(), Self::Error>;

    /// Pins are written as their rectangle plus a name label at the center.
    fn emit_pin(&mut self, pin: &Pin) -> Result<(), Self::Error> {
        self.emit_rect(&pin.rect)?;
        self.emit_label(&Label {
            text: pin.name.clone(),
            layer: pin.rect.layer,
            purpose: pin.rect.purpose,
            position: pin.center(),
        })
    }

    fn end_module(&mut self, module: &Module) -> Result<(), Self::Error>;
}

impl Library {
    /// Emit `top` and everything below it.
    pub fn emit<S: LayoutSink>(&self, top: ModuleKey, sink: &mut S) -> Result<(), S::Error> {
        let mut visited = HashSet::new();
        self.emit_module(top, sink, &mut visited)?;
        log::debug!("emitted {} modules below '{}'", visited.len(), self.module(top)?.name());
        Ok(())
    }

    fn emit_module<S: LayoutSink>(
        &self,
        key: ModuleKey,
        sink: &mut S,
        visited: &mut HashSet<ModuleKey>,
    ) -> Result<(), S::Error> {
        if !visited.insert(key) {
            return Ok(());
        }
        let module = self.module(key)?;
        for instance in module.instances() {
            self.emit_module(instance.module(), sink, visited)?;
        }

        sink.begin_module(module)?;
        for instance in module.instances() {
            sink.emit_instance(instance, self.module(instance.module())?)?;
        }
        for shape in module.shapes() {
            match shape {
                Shape::Rect(r) => sink.emit_rect(r)?,
                Shape::Label(l) => sink.emit_label(l)?,
            }
        }
        if !module.kind().is_library_cell() {
            for pin in module.pins() {
                sink.emit_pin(pin)?;
            }
        }
        sink.end_module(module)
    }
}

/// One call received by a [RecordingSink].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    BeginModule(String),
    Instance { name: String, module: String },
    Rect(Rect),
    Label(Label),
    Pin(String),
    EndModule(String),
}

/// In-memory sink that records every call, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of modules in the order they were begun.
    pub fn module_order(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::BeginModule(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn placements_of(&self, module: &str) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Instance { module: m, .. } if m == module))
            .count()
    }
}

impl LayoutSink for RecordingSink {
    type Error = LayoutError;

    fn begin_module(&mut self, module: &Module) -> Result<(), LayoutError> {
        self.events.push(SinkEvent::BeginModule(module.name().to_string()));
        Ok(())
    }

    fn emit_instance(&mut self, instance: &Instance, definition: &Module) -> Result<(), LayoutError> {
        self.events.push(SinkEvent::Instance {
            name: instance.name().to_string(),
            module: definition.name().to_string(),
        });
        Ok(())
    }

    fn emit_rect(&mut self, rect: &Rect) -> Result<(), LayoutError> {
        self.events.push(SinkEvent::Rect(rect.clone()));
        Ok(())
    }

    fn emit_label(&mut self, label: &Label) -> Result<(), LayoutError> {
        self.events.push(SinkEvent::Label(label.clone()));
        Ok(())
    }

    fn emit_pin(&mut self, pin: &Pin) -> Result<(), LayoutError> {
        self.events.push(SinkEvent::Pin(pin.name.clone()));
        Ok(())
    }

    fn end_module(&mut self, module: &Module) -> Result<(), LayoutError> {
        self.events.push(SinkEvent::EndModule(module.name().to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ModuleKind;
    use crate::geometry::Point;
    use crate::layer::LayerTable;
    use crate::transform::{Mirror, Rotation};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_shared_module_emitted_once() {
        init_logging();
        let mut lib = Library::new(
            "hier",
            LayerTable::new().with_layer("metal1", 68, 20),
            0.005,
        );
        let m1 = lib.layer("metal1").unwrap();

        let mut x = lib.new_module("x", ModuleKind::new("leaf"));
        x.add_rect(&m1, Point::zero(), 1.0, 1.0);
        x.add_pin("a", &m1, Point::zero(), Point::new(0.5, 0.5));
        x.set_size(1.0, 1.0);
        let x = lib.add_module(x).unwrap();

        // Two parents place x twice and three times.
        let mut parents = Vec::new();
        for (name, count) in [("p", 2), ("q", 3)] {
            let mut parent = lib.new_module(name, ModuleKind::new("row"));
            for i in 0..count {
                parent
                    .add_instance(
                        &lib,
                        &format!("x{i}"),
                        x,
                        Point::new(2.0 * i as f64, 0.0),
                        Mirror::R0,
                        Rotation::R0,
                    )
                    .unwrap();
            }
            parents.push(lib.add_module(parent).unwrap());
        }
        let mut top = lib.new_module("top", ModuleKind::new("top"));
        top.add_instance(&lib, "p0", parents[0], Point::zero(), Mirror::R0, Rotation::R0)
            .unwrap();
        top.add_instance(&lib, "q0", parents[1], Point::new(0.0, 5.0), Mirror::MX, Rotation::R0)
            .unwrap();
        let top = lib.add_module(top).unwrap();

        let mut sink = RecordingSink::new();
        lib.emit(top, &mut sink).unwrap();

        assert_eq!(sink.module_order(), vec!["x", "p", "q", "top"]);
        assert_eq!(sink.placements_of("x"), 5);
        assert_eq!(sink.placements_of("p"), 1);
        assert_eq!(sink.placements_of("q"), 1);
        let rects = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Rect(_)))
            .count();
        assert_eq!(rects, 1);
        let pins = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Pin(_)))
            .count();
        assert_eq!(pins, 1);
    }

    #[test]
    fn test_library_cells_do_not_emit_pins() {
        let mut lib = Library::new(
            "cells",
            LayerTable::new().with_layer("metal1", 68, 20),
            0.005,
        );
        let m1 = lib.layer("metal1").unwrap();
        let mut bitcell = lib.new_module("cell_6t", ModuleKind::library_cell("bitcell"));
        bitcell.add_rect(&m1, Point::zero(), 1.0, 1.0);
        bitcell.add_pin("bl", &m1, Point::zero(), Point::new(0.1, 1.0));
        let key = lib.add_module(bitcell).unwrap();

        let mut sink = RecordingSink::new();
        lib.emit(key, &mut sink).unwrap();
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::Pin(_))));
        assert_eq!(
            sink.events.last(),
            Some(&SinkEvent::EndModule("cell_6t".into()))
        );
    }
}
