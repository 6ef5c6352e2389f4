use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use uuid::Uuid;

use crate::cell::{Module, ModuleKind};
use crate::error::{LayoutError, LayoutResult};
use crate::layer::{Layer, LayerTable};
use crate::registry::NameRegistry;

new_key_type! {
    /// Stable handle to a [Module] stored in a [Library]
    pub struct ModuleKey;
}

/// Arena of finished modules plus the technology context they were built in.
///
/// Modules are added once their builder is done and are only reachable
/// through shared references afterwards, so an instance placed anywhere in
/// the hierarchy always sees the geometry it was placed with.
#[derive(Debug, Serialize, Deserialize)]
pub struct Library {
    /// Run identifier.
    pub id: Uuid,
    /// Library name, written to output headers.
    pub name: String,
    /// Technology layers.
    layers: LayerTable,
    /// Manufacturing grid, microns.
    grid: f64,
    /// All modules, addressed by [ModuleKey].
    modules: SlotMap<ModuleKey, Module>,
    /// Names handed out so far.
    registry: NameRegistry,
}

impl Library {
    pub fn new(name: &str, layers: LayerTable, grid: f64) -> Self {
        let id = Uuid::new_v4();
        log::info!("library '{}' ({}) on a {} um grid", name, id, grid);
        Self {
            id,
            name: name.to_string(),
            layers,
            grid,
            modules: SlotMap::with_key(),
            registry: NameRegistry::new(),
        }
    }

    pub fn layers(&self) -> &LayerTable {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> LayoutResult<Layer> {
        self.layers.get(name)
    }

    pub fn grid(&self) -> f64 {
        self.grid
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Start a module on this library's grid. It is not registered until
    /// [Library::add_module].
    pub fn new_module(&self, name: &str, kind: ModuleKind) -> Module {
        Module::new(name, kind, self.grid)
    }

    /// Freeze `module` into the arena.
    ///
    /// A name already in use is an error unless the module's kind shares
    /// names; a shared name resolves to the existing module when the
    /// geometry is identical and is an error otherwise.
    pub fn add_module(&mut self, module: Module) -> LayoutResult<ModuleKey> {
        if let Some(existing) = self.registry.lookup(module.name()) {
            if !module.kind().shares_name() || existing.kind != module.kind().name {
                return Err(LayoutError::DuplicateModuleName {
                    name: module.name().to_string(),
                    existing_kind: existing.kind.clone(),
                });
            }
            let key = existing.key;
            return match self.modules.get(key) {
                Some(previous) if *previous == module => {
                    log::debug!("reusing module '{}'", module.name());
                    Ok(key)
                }
                _ => Err(LayoutError::ConflictingModule {
                    name: module.name().to_string(),
                }),
            };
        }
        let name = module.name().to_string();
        let kind = module.kind().name.clone();
        let key = self.modules.insert(module);
        self.registry.register(&name, &kind, key);
        log::info!("added {} module '{}'", kind, name);
        Ok(key)
    }

    pub fn module(&self, key: ModuleKey) -> LayoutResult<&Module> {
        self.modules
            .get(key)
            .ok_or_else(|| LayoutError::UnknownModule(self.name.clone()))
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleKey> {
        self.registry.lookup(name).map(|entry| entry.key)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn all_modules(&self) -> impl Iterator<Item = (ModuleKey, &Module)> {
        self.modules.iter()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
