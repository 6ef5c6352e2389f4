//! # Cellweave I/O
//!
//! Stream output for layout libraries. The GDS-II writer plugs into
//! [cellweave_core::Library::emit] as a [cellweave_core::LayoutSink].

pub mod gds;

pub use gds::{write_library, GdsError, GdsResult, GdsWriter};
