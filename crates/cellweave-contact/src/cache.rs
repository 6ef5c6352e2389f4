use std::collections::HashMap;

use cellweave_core::{BBox, Instance, Library, Mirror, Module, ModuleKey, Point, Rotation, Transform};
use cellweave_rules::{DesignRules, Technology};

use crate::contact::{build_contact, ContactParams};
use crate::error::ContactResult;

/// Contacts built so far, by parameters.
#[derive(Debug, Default)]
pub struct ContactCache {
    built: HashMap<ContactParams, ModuleKey>,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, params: &ContactParams) -> Option<ModuleKey> {
        self.built.get(params).copied()
    }

    pub fn get_or_build(
        &mut self,
        lib: &mut Library,
        rules: &DesignRules<'_>,
        params: &ContactParams,
    ) -> ContactResult<ModuleKey> {
        if let Some(key) = self.get(params) {
            return Ok(key);
        }
        let key = build_contact(lib, rules, params)?;
        self.built.insert(params.clone(), key);
        Ok(key)
    }

    /// Build the 1x1 contact of every via stack `tech` declares.
    pub fn prebuild(&mut self, lib: &mut Library, tech: &Technology) -> ContactResult<usize> {
        let rules = tech.rules();
        for stack in &tech.stacks {
            self.get_or_build(lib, &rules, &ContactParams::from_stack(stack))?;
        }
        log::info!("prebuilt {} contacts for '{}'", tech.stacks.len(), tech.name);
        Ok(tech.stacks.len())
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }
}

/// Place `contact` in `parent` so its center lands on `center`.
pub fn place_contact_center<'a>(
    parent: &'a mut Module,
    lib: &Library,
    name: &str,
    contact: ModuleKey,
    center: Point,
    rotation: Rotation,
) -> ContactResult<&'a Instance> {
    let definition = lib.module(contact)?;
    let local = BBox::from_size(Point::zero(), definition.width(), definition.height());
    let placed = Transform::new(Point::zero(), Mirror::R0, rotation).apply_box(&local);
    let offset = center - placed.center();
    Ok(parent.add_instance(lib, name, contact, offset, Mirror::R0, rotation)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContactError;
    use cellweave_core::ModuleKind;

    const TECH: &str = r#"
name: cache
grid: 0.005
layers:
  active: { layer: 65, purpose: 20 }
  contact: { layer: 66, purpose: 44 }
  metal1: { layer: 68, purpose: 20 }
  via1: { layer: 68, purpose: 44 }
  metal2: { layer: 69, purpose: 20 }
rules:
  minwidth_active: 0.15
  minwidth_contact: 0.17
  contact_to_contact: 0.17
  active_enclosure_contact: 0.01
  metal1_enclosure_contact: 0.03
  metal1_extend_contact: 0.06
  minwidth_metal1: 0.14
  minwidth_metal2: 0.14
  minwidth_via1: 0.2
  via1_to_via1: 0.2
  metal1_enclosure_via1: 0.06
  metal2_enclosure_via1: 0.08
stacks:
  - { bottom: active, cut: contact, top: metal1 }
  - { bottom: metal1, cut: via1, top: metal2 }
"#;

    #[test]
    fn test_prebuild_and_reuse() {
        let tech = Technology::from_yaml(TECH).unwrap();
        let mut lib = tech.library("cache");
        let mut cache = ContactCache::new();
        assert_eq!(cache.prebuild(&mut lib, &tech).unwrap(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(lib.module_count(), 2);

        let rules = tech.rules();
        let params = ContactParams::new("metal1", "via1", "metal2");
        let key = cache.get(&params).unwrap();
        assert_eq!(cache.get_or_build(&mut lib, &rules, &params).unwrap(), key);

        let array = params.clone().array(2, 1);
        let other = cache.get_or_build(&mut lib, &rules, &array).unwrap();
        assert_ne!(other, key);
        assert_eq!(lib.module_count(), 3);

        // A second cache resolves to the same shared module.
        let mut fresh = ContactCache::new();
        assert_eq!(fresh.get_or_build(&mut lib, &rules, &params).unwrap(), key);
        assert_eq!(lib.module_count(), 3);
    }

    #[test]
    fn test_demo_technology_stacks_build() {
        let tech = Technology::from_yaml(include_str!("../../../tech/demo.yaml")).unwrap();
        let mut lib = tech.library("demo");
        let mut cache = ContactCache::new();
        assert_eq!(cache.prebuild(&mut lib, &tech).unwrap(), tech.stacks.len());
        for (_, module) in lib.all_modules() {
            assert!(module.width() > 0.0 && module.height() > 0.0, "{}", module.name());
        }
    }

    #[test]
    fn test_place_contact_center() {
        let tech = Technology::from_yaml(TECH).unwrap();
        let mut lib = tech.library("place");
        let mut cache = ContactCache::new();
        let rules = tech.rules();
        let key = cache
            .get_or_build(&mut lib, &rules, &ContactParams::new("metal1", "via1", "metal2").array(1, 2))
            .unwrap();

        let mut parent = lib.new_module("strap", ModuleKind::new("route"));
        let target = Point::new(1.0, 2.0);
        let upright = place_contact_center(&mut parent, &lib, "v0", key, target, Rotation::R0)
            .unwrap()
            .boundary();
        assert!(upright.center().approx_eq(&target, 1e-6));
        assert!((upright.height() - 0.76).abs() < 1e-6);

        let turned = place_contact_center(&mut parent, &lib, "v1", key, target, Rotation::R90)
            .unwrap()
            .boundary();
        assert!(turned.center().approx_eq(&target, 1e-6));
        assert!((turned.width() - 0.76).abs() < 1e-6);

        assert!(matches!(
            place_contact_center(&mut parent, &lib, "v0", key, target, Rotation::R0),
            Err(ContactError::Layout(_))
        ));
    }
}
