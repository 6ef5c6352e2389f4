//! # Cellweave Core
//!
//! Hierarchical layout kernel: exact quarter-turn transforms, rectangles and
//! pins, modules placed by reference through instances, recursive shape and
//! blockage queries, and a memoized traversal that hands each module to an
//! output sink exactly once.
//!
//! Every higher-level generator is a client of this crate.

pub mod cell;
pub mod database;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod output;
pub mod registry;
pub mod spatial;
pub mod transform;

pub use cell::{Instance, Module, ModuleKind, Pin, Placeable};
pub use database::{Library, ModuleKey};
pub use error::{LayoutError, LayoutResult};
pub use geometry::{BBox, Label, Point, Rect, Shape};
pub use layer::{Layer, LayerId, LayerTable, PurposeId};
pub use output::{LayoutSink, RecordingSink, SinkEvent};
pub use registry::NameRegistry;
pub use spatial::BlockageIndex;
pub use transform::{Mirror, Rotation, Transform, Transformable};
