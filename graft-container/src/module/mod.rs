//! Declarative modules.
//!
//! A [`Module`] groups providers and says what it imports and what it
//! publishes. [`Injector::from_module`](crate::injector::Injector::from_module)
//! turns a module graph into an injector hierarchy: one injector per module,
//! built once even when several modules import it.
//!
//! ```rust
//! use graft_container::prelude::*;
//!
//! let database = Module::builder("database")
//!     .export_provider(ProviderDescriptor::value("pool", "pg-pool"))
//!     .provide(ProviderDescriptor::value("password", "hunter2").private())
//!     .build();
//!
//! let app = Module::builder("app").import(&database).build();
//! let injector = Injector::from_module(&app)?;
//!
//! assert_eq!(*injector.get_as::<&str>("pool", vec![])?, "pg-pool");
//! assert!(injector.get_sync("password", vec![]).is_err());
//! # Ok::<(), graft_container::GraftError>(())
//! ```

pub(crate) mod resolver;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;

use crate::descriptor::ProviderDescriptor;
use crate::error::Result;
use crate::token::Token;

static NEXT_MODULE: AtomicU64 = AtomicU64::new(1);

type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<Module>> + Send + Sync>;

/// A module whose metadata is produced asynchronously.
#[derive(Clone)]
pub struct LazyModule {
    id: u64,
    name: Arc<str>,
    load: Loader,
}

impl LazyModule {
    pub fn new<F, Fut>(name: &str, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Module>> + Send + 'static,
    {
        Self {
            id: NEXT_MODULE.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            load: Arc::new(move || load().boxed()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn load(&self) -> BoxFuture<'static, Result<Module>> {
        (self.load)()
    }
}

impl fmt::Debug for LazyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyModule").field("name", &self.name).finish()
    }
}

/// A module named before it is built, so two modules can import each
/// other without a lazy load.
///
/// Held weakly: the module must still be alive when the hierarchy is built.
///
/// ```
/// use graft_container::module::ForwardModule;
/// use graft_container::prelude::*;
///
/// let forward = ForwardModule::new();
/// let b = Module::builder("b").import_forward(&forward).build();
/// let a = Module::builder("a").import(&b).build();
/// assert!(forward.set(&a));
/// assert_eq!(forward.get().map(|m| m.id()), Some(a.id()));
/// ```
#[derive(Clone, Default)]
pub struct ForwardModule(Arc<OnceCell<Weak<ModuleInner>>>);

impl ForwardModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the reference at `module`; `false` if it was already set.
    pub fn set(&self, module: &Module) -> bool {
        self.0.set(Arc::downgrade(&module.0)).is_ok()
    }

    pub fn get(&self) -> Option<Module> {
        self.0.get().and_then(Weak::upgrade).map(Module)
    }
}

impl fmt::Debug for ForwardModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForwardModule")
            .field(&self.get().map(|module| module.name().to_string()))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Import {
    Module(Module),
    Lazy(LazyModule),
    Forward(ForwardModule),
}

#[derive(Debug, Clone)]
pub enum Export {
    Token(Token),
    /// Whatever the module itself exports; one hop only.
    Module(Module),
}

struct ModuleInner {
    id: u64,
    name: Arc<str>,
    imports: Vec<Import>,
    providers: Vec<ProviderDescriptor>,
    exports: Vec<Export>,
    extends: Option<Module>,
}

/// Module metadata. Cheap to clone; identity is preserved across clones.
#[derive(Clone)]
pub struct Module(Arc<ModuleInner>);

impl Module {
    pub fn builder(name: &str) -> ModuleBuilder {
        ModuleBuilder {
            name: name.to_string(),
            imports: Vec::new(),
            providers: Vec::new(),
            exports: Vec::new(),
            extends: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The base module this one extends.
    pub fn base(&self) -> Option<&Module> {
        self.0.extends.as_ref()
    }

    /// Imports of the base chain first, then this module's own.
    pub fn imports(&self) -> Vec<Import> {
        self.merged(|module| &module.0.imports)
    }

    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.merged(|module| &module.0.providers)
    }

    pub fn exports(&self) -> Vec<Export> {
        self.merged(|module| &module.0.exports)
    }

    /// Token exports only, for one-hop re-exports.
    pub(crate) fn exported_tokens(&self) -> Vec<Token> {
        self.exports()
            .into_iter()
            .filter_map(|export| match export {
                Export::Token(token) => Some(token),
                Export::Module(_) => None,
            })
            .collect()
    }

    fn merged<T: Clone>(&self, field: impl Fn(&Module) -> &Vec<T>) -> Vec<T> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(base) = current.base() {
            // A malformed chain that loops back stops at the repeat.
            if chain.iter().any(|seen| seen.id() == base.id()) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain.iter().rev().flat_map(|module| field(module).iter().cloned()).collect()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("imports", &self.0.imports.len())
            .field("providers", &self.0.providers.len())
            .field("exports", &self.0.exports)
            .finish()
    }
}

/// Assembles a [`Module`].
pub struct ModuleBuilder {
    name: String,
    imports: Vec<Import>,
    providers: Vec<ProviderDescriptor>,
    exports: Vec<Export>,
    extends: Option<Module>,
}

impl ModuleBuilder {
    pub fn import(mut self, module: &Module) -> Self {
        self.imports.push(Import::Module(module.clone()));
        self
    }

    /// Imports a module that must be loaded before the hierarchy is built.
    pub fn import_lazy(mut self, module: LazyModule) -> Self {
        self.imports.push(Import::Lazy(module));
        self
    }

    /// Imports a module that is built later; see [`ForwardModule`].
    pub fn import_forward(mut self, module: &ForwardModule) -> Self {
        self.imports.push(Import::Forward(module.clone()));
        self
    }

    pub fn provide(mut self, descriptor: ProviderDescriptor) -> Self {
        self.providers.push(descriptor);
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(Export::Token(token.into()));
        self
    }

    pub fn export_module(mut self, module: &Module) -> Self {
        self.exports.push(Export::Module(module.clone()));
        self
    }

    /// Provides `descriptor` and exports its token.
    pub fn export_provider(self, descriptor: ProviderDescriptor) -> Self {
        let token = descriptor.token.clone();
        self.provide(descriptor).export(token)
    }

    /// Starts from `base`'s metadata.
    pub fn extends(mut self, base: &Module) -> Self {
        self.extends = Some(base.clone());
        self
    }

    pub fn build(self) -> Module {
        Module(Arc::new(ModuleInner {
            id: NEXT_MODULE.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(self.name),
            imports: self.imports,
            providers: self.providers,
            exports: self.exports,
            extends: self.extends,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_merges_base_first() {
        let base = Module::builder("base")
            .export_provider(ProviderDescriptor::value("a", ()))
            .build();
        let derived = Module::builder("derived")
            .extends(&base)
            .export_provider(ProviderDescriptor::value("b", ()))
            .build();

        let tokens: Vec<String> = derived.providers().iter().map(|p| p.token.to_string()).collect();
        assert_eq!(tokens, vec!["a", "b"]);
        assert_eq!(derived.exported_tokens(), vec![Token::named("a"), Token::named("b")]);
        assert_ne!(base.id(), derived.id());
    }

    #[test]
    fn module_exports_are_not_tokens() {
        let inner = Module::builder("inner").export("x").build();
        let outer = Module::builder("outer").export_module(&inner).export("y").build();
        assert_eq!(outer.exported_tokens(), vec![Token::named("y")]);
        assert_eq!(outer.exports().len(), 2);
    }
}
