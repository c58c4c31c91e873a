//! Module graph → injector hierarchy.
//!
//! A depth-first walk over imports. Each module gets one injector per
//! hierarchy, recorded before its imports are walked, so diamond imports
//! reuse it and import cycles end at the first revisit.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, trace};

use super::{Export, Import, Module};
use crate::error::{GraftError, Result};
use crate::events::LifecycleEvent;
use crate::injector::Injector;

pub(crate) struct ModuleResolver {
    /// Lazy module id → the module it loaded.
    loaded: HashMap<u64, Module>,
    /// Modules whose imports are being walked.
    visiting: HashSet<u64>,
    /// Current DFS path, for diagnostics.
    path: Vec<String>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            visiting: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Loads every lazy module reachable from `root`, each once.
    pub async fn preload(root: &Module) -> Result<Self> {
        let mut resolver = Self::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];

        while let Some(module) = stack.pop() {
            if !seen.insert(module.id()) {
                continue;
            }
            for import in module.imports() {
                match import {
                    Import::Module(imported) => stack.push(imported),
                    Import::Forward(forward) => stack.extend(forward.get()),
                    Import::Lazy(lazy) => {
                        if let Some(loaded) = resolver.loaded.get(&lazy.id()) {
                            stack.push(loaded.clone());
                            continue;
                        }
                        debug!(module = lazy.name(), importer = module.name(), "Loading lazy module");
                        let loaded = lazy.load().await?;
                        resolver.loaded.insert(lazy.id(), loaded.clone());
                        stack.push(loaded);
                    }
                }
            }
        }
        Ok(resolver)
    }

    /// Populates `target` with `module`: providers, import edges to the
    /// injectors of imported modules (built on first sight), then exports.
    #[instrument(level = "debug", skip_all, fields(module = %module.name(), injector = %target.name()))]
    pub fn install(&mut self, target: &Injector, module: &Module) -> Result<()> {
        target.register_module(module.id());
        self.visiting.insert(module.id());
        self.path.push(module.name().to_string());

        for descriptor in module.providers() {
            target.provide(descriptor)?;
        }

        for import in module.imports() {
            let imported = self.materialize(&import, module)?;
            let injector = match target.find_module(imported.id()) {
                Some(existing) => {
                    if self.visiting.contains(&imported.id()) {
                        trace!(cycle = ?self.path, module = imported.name(), "Module cycle");
                    }
                    existing
                }
                None => {
                    let child = target.module_child(imported.name());
                    self.install(&child, &imported)?;
                    child
                }
            };
            target.add_import(&injector);
        }

        for export in module.exports() {
            match export {
                Export::Token(token) => target.export(token)?,
                Export::Module(reexported) => {
                    for token in reexported.exported_tokens() {
                        target.export(token)?;
                    }
                }
            }
        }

        self.path.pop();
        self.visiting.remove(&module.id());
        target.events().emit(&LifecycleEvent::ModuleAdded {
            module: module.name().to_string(),
            injector: target.name().to_string(),
        });
        Ok(())
    }

    fn materialize(&self, import: &Import, importer: &Module) -> Result<Module> {
        match import {
            Import::Module(module) => Ok(module.clone()),
            Import::Forward(forward) => forward.get().ok_or_else(|| GraftError::UnsetForwardImport {
                module: importer.name().to_string(),
            }),
            Import::Lazy(lazy) => self
                .loaded
                .get(&lazy.id())
                .cloned()
                .ok_or_else(|| GraftError::AsyncModule {
                    module: importer.name().to_string(),
                }),
        }
    }
}
