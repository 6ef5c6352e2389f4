use thiserror::Error;

/// Result alias used throughout the layout kernel.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Fatal conditions raised while composing a layout.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("mirror '{0}' encodes a rotation; pass the rotation separately")]
    MirrorEncodesRotation(String),

    #[error("unknown mirror '{0}' (expected R0, MX, MY or XY)")]
    UnknownMirror(String),

    #[error("rotation {0} is not a multiple of 90 degrees")]
    InvalidRotation(f64),

    #[error("layer '{0}' is not defined in the layer table")]
    UnknownLayer(String),

    #[error("module name '{name}' is already in use by a {existing_kind} module")]
    DuplicateModuleName { name: String, existing_kind: String },

    #[error("module '{name}' was rebuilt with different geometry under the same name")]
    ConflictingModule { name: String },

    #[error("instance '{instance}' already exists in module '{module}'")]
    DuplicateInstanceName { module: String, instance: String },

    #[error("module handle does not refer to a module in library '{0}'")]
    UnknownModule(String),

    #[error("pin '{pin}' not found in module '{module}'")]
    PinNotFound { module: String, pin: String },

    #[error("pin '{pin}' of module '{module}' has no entry at index {index}")]
    PinIndexOutOfRange {
        module: String,
        pin: String,
        index: usize,
    },

    #[error("pin '{pin}' segment ({x0}, {y0}) -> ({x1}, {y1}) is not manhattan")]
    NonManhattanPin {
        pin: String,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    },
}
