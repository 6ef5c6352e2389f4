//! # Cellweave Rules
//!
//! Design-rule resolution for layout generators. A [Technology] bundles the
//! grid, layer numbers, flat rule table and via stacks of a process; the
//! [DesignRules] accessor turns rule-table keys into widths, spacings,
//! enclosures and areas, applying the fallback cascade between specific and
//! generic keys.

pub mod class;
pub mod error;
pub mod rules;
pub mod table;
pub mod tech;

pub use class::LayerClass;
pub use error::{RuleError, RuleResult};
pub use rules::{DesignRules, SpacingQuery};
pub use table::RuleTable;
pub use tech::{Technology, ViaStack};
