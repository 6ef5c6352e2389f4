//! # Cellweave Contact
//!
//! Contact and via stacks sized from design rules: a cut array between two
//! conductors, each conductor enclosing the cuts by its governing rule,
//! optionally with an implant and well around the bottom conductor.
//! Built contacts are shared modules and are cached by their parameters.

pub mod cache;
pub mod contact;
pub mod error;

pub use cache::{place_contact_center, ContactCache};
pub use contact::{build_contact, ContactGeometry, ContactParams, ContactStyle, Enclosure};
pub use error::{ContactError, ContactResult};
