use cellweave_core::LayoutError;
use cellweave_rules::RuleError;
use thiserror::Error;

pub type ContactResult<T> = Result<T, ContactError>;

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("contact '{name}' needs both an implant and a well layer (implant: {implant:?}, well: {well:?})")]
    PartialImplantWell {
        name: String,
        implant: Option<String>,
        well: Option<String>,
    },

    #[error("contact array must be at least 1x1, got {count_x}x{count_y}")]
    InvalidArray { count_x: u32, count_y: u32 },

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
