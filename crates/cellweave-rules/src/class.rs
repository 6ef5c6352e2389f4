use std::fmt;

/// Rule-relevant family of a layer, derived from its symbolic name.
///
/// Metal layers are named `metal1` .. `metalN`; implant layers end in
/// `implant` and well layers in `well`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerClass {
    Implant,
    Well,
    Metal(u32),
    Other,
}

impl LayerClass {
    pub fn classify(layer: &str) -> Self {
        let name = layer.to_ascii_lowercase();
        if name.ends_with("implant") {
            return LayerClass::Implant;
        }
        if name.ends_with("well") {
            return LayerClass::Well;
        }
        match name.strip_prefix("metal").map(str::parse::<u32>) {
            Some(Ok(index)) if index > 0 => LayerClass::Metal(index),
            _ => LayerClass::Other,
        }
    }

    /// Generic key stem shared by every layer of an aliased family.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            LayerClass::Implant => Some("implant"),
            LayerClass::Well => Some("well"),
            _ => None,
        }
    }

    pub fn is_metal(&self) -> bool {
        matches!(self, LayerClass::Metal(_))
    }
}

impl fmt::Display for LayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerClass::Implant => write!(f, "implant"),
            LayerClass::Well => write!(f, "well"),
            LayerClass::Metal(n) => write!(f, "metal{n}"),
            LayerClass::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(LayerClass::classify("nimplant"), LayerClass::Implant);
        assert_eq!(LayerClass::classify("pimplant"), LayerClass::Implant);
        assert_eq!(LayerClass::classify("nwell"), LayerClass::Well);
        assert_eq!(LayerClass::classify("metal3"), LayerClass::Metal(3));
        assert_eq!(LayerClass::classify("metal"), LayerClass::Other);
        assert_eq!(LayerClass::classify("metal0"), LayerClass::Other);
        assert_eq!(LayerClass::classify("poly"), LayerClass::Other);
        assert_eq!(LayerClass::Implant.alias(), Some("implant"));
        assert!(LayerClass::Metal(1).is_metal());
    }
}
