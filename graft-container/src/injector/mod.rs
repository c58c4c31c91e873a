//! # The Injector
//!
//! The unit applications talk to. An injector owns a provider registry,
//! links to a parent, and sees the exports of the module injectors it
//! imports.
//!
//! ```text
//!              root ─── settings, event bus, module index (shared)
//!             ╱    ╲
//!   child("request")  AppModule ──imports──> UsersModule
//!                         │                      │
//!                         └──imports──> DbModule <┘   (one injector per module)
//! ```
//!
//! Lookup at an injector tries, in order: its own registry, providers
//! declared with [`auto_provide!`](crate::auto_provide), the exports of its
//! imports, then its parent.
//!
//! # Examples
//! ```rust
//! use graft_container::prelude::*;
//!
//! struct Greeter {
//!     greeting: Arc<String>,
//! }
//!
//! let injector = Injector::new();
//! injector.provide(ProviderDescriptor::value("greeting", "hello".to_string()))?;
//! injector.provide(
//!     ProviderDescriptor::class(Token::of::<Greeter>(), |args| {
//!         Ok(Greeter { greeting: args.get::<String>(0)? })
//!     })
//!     .inject("greeting")
//!     .scope(Scope::Singleton),
//! )?;
//!
//! let greeter = injector.resolve::<Greeter>()?;
//! assert_eq!(greeter.greeting.as_str(), "hello");
//! # Ok::<(), graft_container::GraftError>(())
//! ```

mod resolve;

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, instrument, trace};

use crate::annotations::Visibility;
use crate::auto::{self, ProvidedIn};
use crate::descriptor::{Absent, Args, InjectionArgument, ProviderDescriptor};
use crate::destroy::{DestroyEvent, Destroyable, teardown};
use crate::error::{GraftError, Result};
use crate::events::{EventBus, LifecycleEvent, Plugin};
use crate::pipeline::{Hook, Next, run_hooks};
use crate::hooks;
use crate::module::Module;
use crate::module::resolver::ModuleResolver;
use crate::record::DefinitionRecord;
use crate::registry::Registry;
use crate::resolution::{Resolution, Value, downcast, same_value};
use crate::session::{InjectionSite, Session};
use crate::settings::InjectorSettings;
use crate::token::Token;

static NEXT_INJECTOR: AtomicU64 = AtomicU64::new(1);

/// State shared by every injector of one hierarchy.
struct Hierarchy {
    settings: InjectorSettings,
    events: Arc<EventBus>,
    /// Module id → the injector built for it.
    modules: DashMap<u64, WeakInjector>,
}

/// Injectors created with [`Injector::child`] keep their parent alive;
/// module injectors are owned by their importer and point back weakly.
enum ParentLink {
    Strong(Injector),
    Weak(WeakInjector),
}

struct InjectorInner {
    id: u64,
    name: Arc<str>,
    parent: Option<ParentLink>,
    registry: Registry,
    imports: RwLock<Vec<WeakInjector>>,
    exports: RwLock<HashSet<Token>>,
    /// Module injectors created by this one.
    owned: Mutex<Vec<Injector>>,
    /// Injectors created with [`Injector::child`].
    children: Mutex<Vec<WeakInjector>>,
    /// Teardowns started outside of `destroy` that went asynchronous or failed.
    deferred: Mutex<Vec<BoxFuture<'static, Result<()>>>>,
    destroyed: AtomicBool,
    hierarchy: Arc<Hierarchy>,
}

/// A node of the injector hierarchy. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct Injector(Arc<InjectorInner>);

/// Non-owning handle to an [`Injector`].
#[derive(Clone)]
pub struct WeakInjector {
    inner: Weak<InjectorInner>,
    id: u64,
    name: Arc<str>,
}

impl WeakInjector {
    pub fn upgrade(&self) -> Option<Injector> {
        self.inner.upgrade().map(Injector)
    }

    /// `true` when this handle points at `injector`.
    pub fn is(&self, injector: &Injector) -> bool {
        self.id == injector.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WeakInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakInjector")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════

impl Injector {
    /// A root injector with default settings.
    pub fn new() -> Self {
        let injector = Self::root("root", InjectorSettings::default(), Arc::new(EventBus::new()));
        injector.announce();
        injector
    }

    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::default()
    }

    /// A root injector built from `module` and everything it imports.
    ///
    /// # Errors
    /// [`GraftError::AsyncModule`] when the graph contains a lazily loaded
    /// module; use [`from_module_async`](Injector::from_module_async).
    pub fn from_module(module: &Module) -> Result<Self> {
        Self::builder().name(module.name()).module(module.clone()).build()
    }

    /// Like [`from_module`](Injector::from_module), loading lazy imports
    /// first.
    pub async fn from_module_async(module: &Module) -> Result<Self> {
        Self::builder()
            .name(module.name())
            .module(module.clone())
            .build_async()
            .await
    }

    fn root(name: &str, settings: InjectorSettings, events: Arc<EventBus>) -> Self {
        let hierarchy = Arc::new(Hierarchy {
            settings,
            events,
            modules: DashMap::new(),
        });
        Self::create(name, None, hierarchy)
    }

    fn create(name: &str, parent: Option<ParentLink>, hierarchy: Arc<Hierarchy>) -> Self {
        Self(Arc::new(InjectorInner {
            id: NEXT_INJECTOR.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            parent,
            registry: Registry::new(),
            imports: RwLock::new(Vec::new()),
            exports: RwLock::new(HashSet::new()),
            owned: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            deferred: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            hierarchy,
        }))
    }

    fn announce(&self) {
        debug!(injector = %self.name(), id = self.id(), "Injector created");
        self.events().emit(&LifecycleEvent::InjectorCreated {
            injector: self.name().to_string(),
        });
    }

    /// A child that falls back to this injector on a miss and shares its
    /// settings and event bus. The child keeps this injector alive.
    pub fn child(&self, name: &str) -> Injector {
        let child = Self::create(
            name,
            Some(ParentLink::Strong(self.clone())),
            self.0.hierarchy.clone(),
        );
        self.0.children.lock().push(child.downgrade());
        child.announce();
        child
    }

    /// A module injector owned by this one.
    pub(crate) fn module_child(&self, name: &str) -> Injector {
        let child = Self::create(
            name,
            Some(ParentLink::Weak(self.downgrade())),
            self.0.hierarchy.clone(),
        );
        self.0.owned.lock().push(child.clone());
        child.announce();
        child
    }

    // ── Accessors ──

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<Injector> {
        match self.0.parent.as_ref()? {
            ParentLink::Strong(parent) => Some(parent.clone()),
            ParentLink::Weak(parent) => parent.upgrade(),
        }
    }

    pub fn settings(&self) -> &InjectorSettings {
        &self.0.hierarchy.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.0.hierarchy.events
    }

    /// Live module injectors this one imports.
    pub fn imports(&self) -> Vec<Injector> {
        self.0
            .imports
            .read()
            .iter()
            .filter_map(WeakInjector::upgrade)
            .collect()
    }

    /// The injector built for `module` in this hierarchy.
    pub fn module(&self, module: &Module) -> Option<Injector> {
        self.find_module(module.id())
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakInjector {
        WeakInjector {
            inner: Arc::downgrade(&self.0),
            id: self.0.id,
            name: self.0.name.clone(),
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.0.registry
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(GraftError::InjectorDestroyed {
                injector: self.name().to_string(),
            });
        }
        Ok(())
    }

    // ── Module wiring ──

    pub(crate) fn find_module(&self, id: u64) -> Option<Injector> {
        self.0
            .hierarchy
            .modules
            .get(&id)
            .and_then(|entry| entry.value().upgrade())
    }

    pub(crate) fn register_module(&self, id: u64) {
        self.0.hierarchy.modules.insert(id, self.downgrade());
    }

    /// Adds a visibility edge to `exporter`.
    pub(crate) fn add_import(&self, exporter: &Injector) {
        let mut imports = self.0.imports.write();
        if imports.iter().any(|edge| edge.is(exporter)) || exporter.id() == self.id() {
            return;
        }
        trace!(injector = %self.name(), exporter = %exporter.name(), "Import edge");
        imports.push(exporter.downgrade());
    }

    /// Publishes `token` to importers. A token with no local provider gets
    /// a pass-through that resolves it from this injector's own imports.
    pub(crate) fn export(&self, token: Token) -> Result<()> {
        let local = self.0.registry.contains(&token);
        if !self.0.exports.write().insert(token.clone()) || local {
            return Ok(());
        }
        trace!(injector = %self.name(), token = %token, "Re-exporting");
        self.provide(ProviderDescriptor::existing(token.clone(), token).hook(hooks::imported_only()))
    }

    pub(crate) fn exports(&self, token: &Token) -> bool {
        self.0.exports.read().contains(token)
    }

    // ═══════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════

    /// Registers a provider at runtime.
    ///
    /// A registration that takes the slot of an existing definition tears
    /// down that definition's instances with [`DestroyEvent::Replaced`].
    ///
    /// # Errors
    /// - [`GraftError::MultiProviderConflict`]
    /// - [`GraftError::AlreadyRegistered`] when overriding is disabled
    /// - [`GraftError::InjectorDestroyed`]
    pub fn provide(&self, descriptor: ProviderDescriptor) -> Result<()> {
        self.ensure_alive()?;
        let token = descriptor.token.clone();
        let registered = self
            .0
            .registry
            .register(self, descriptor, self.settings().allow_override)?;

        self.events().emit(&LifecycleEvent::ProviderAdded {
            injector: self.name().to_string(),
            token,
        });

        if let Some(replaced) = registered.replaced {
            self.retire(&replaced);
        }
        Ok(())
    }

    fn retire(&self, definition: &Arc<DefinitionRecord>) {
        let teardowns: Vec<_> = definition
            .instances()
            .into_iter()
            .map(|record| teardown(record, DestroyEvent::Replaced, self.events().clone()))
            .collect();
        self.defer(Resolution::join_all(teardowns).map(|_| ()));
    }

    /// Keeps a teardown started outside of [`destroy`](Injector::destroy)
    /// until `destroy` can await it or report its error.
    pub(crate) fn defer(&self, teardown: Resolution<()>) {
        match teardown {
            Resolution::Ready(Ok(())) => {}
            Resolution::Ready(Err(error)) => {
                self.0.deferred.lock().push(futures::future::ready(Err(error)).boxed());
            }
            Resolution::Pending(future) => self.0.deferred.lock().push(future),
        }
    }

    /// Registers the `auto_provide!` providers for `token` that target this
    /// injector. `at_start` is true for the injector the request began in.
    fn auto_register(&self, token: &Token, at_start: bool) -> bool {
        if !self.settings().auto_register || self.0.registry.contains(token) {
            return false;
        }
        let is_root = self.0.parent.is_none();
        let mut registered = false;
        for provider in auto::candidates(token) {
            let applies = match provider.provided_in {
                ProvidedIn::Root => is_root,
                ProvidedIn::Any => at_start,
            };
            if applies && self.provide((provider.descriptor)()).is_ok() {
                registered = true;
            }
        }
        if registered {
            debug!(token = %token, injector = %self.name(), "Auto-registered provider");
        }
        registered
    }

    // ═══════════════════════════════════════════
    // Resolution
    // ═══════════════════════════════════════════

    /// Resolves `token`, running `hooks` around the lookup.
    ///
    /// The result is ready when the whole graph is synchronous; otherwise it
    /// is a future that can be `.await`ed.
    #[instrument(level = "trace", skip_all, fields(injector = %self.0.name))]
    pub fn get(&self, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Resolution<Value> {
        self.inject(token.into(), hooks, None, None)
    }

    /// Resolves `token` and requires the graph to be synchronous.
    ///
    /// # Errors
    /// [`GraftError::AsyncResolution`] when something in the graph returned
    /// a future, plus every lookup or construction error.
    pub fn get_sync(&self, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Result<Value> {
        let token = token.into();
        self.get(token.clone(), hooks).into_sync(&token)
    }

    pub async fn get_async(&self, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Result<Value> {
        self.get(token, hooks).await
    }

    /// Resolves `Token::of::<T>()` synchronously.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get_as::<T>(Token::of::<T>(), Vec::new())
    }

    pub async fn resolve_async<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let token = Token::of::<T>();
        let value = self.get(token.clone(), Vec::new()).await?;
        downcast::<T>(&token, value)
    }

    /// Resolves `token` synchronously and downcasts the value.
    pub fn get_as<T: Any + Send + Sync>(&self, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Result<Arc<T>> {
        let token = token.into();
        let value = self.get_sync(token.clone(), hooks)?;
        downcast::<T>(&token, value)
    }

    /// `None` when nothing provides `token`.
    pub fn get_optional<T: Any + Send + Sync>(&self, token: impl Into<Token>) -> Result<Option<Arc<T>>> {
        let token = token.into();
        let value = self.get_sync(token.clone(), vec![hooks::optional()])?;
        if value.is::<Absent>() {
            return Ok(None);
        }
        downcast::<T>(&token, value).map(Some)
    }

    /// Every value of a multi provider, in (order, registration) order.
    pub fn get_all<T: Any + Send + Sync>(&self, token: impl Into<Token>) -> Result<Vec<Arc<T>>> {
        let token = token.into();
        let value = self.get_sync(token.clone(), Vec::new())?;
        let values = downcast::<Vec<Value>>(&token, value)?;
        values
            .iter()
            .map(|value| downcast::<T>(&token, value.clone()))
            .collect()
    }

    /// Resolves `token` as a dependency of `session`.
    ///
    /// Adapter code that runs inside a construction passes the session it
    /// was handed; the new request joins that resolution graph.
    pub fn get_within(&self, session: &Session, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Resolution<Value> {
        self.inject(token.into(), hooks, Some(session.clone()), None)
    }

    /// Reports where `token` would resolve without building anything.
    pub fn inspect(&self, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Result<Inspection> {
        let token = token.into();
        let lookup = Session::new(token.clone(), self.clone(), hooks, None, None).dry_run();
        self.run_session(lookup.clone()).into_sync(&token)?;
        trace!(token = %token, "Inspected\n{}", lookup.describe());
        Ok(Inspection {
            token,
            injector: lookup.resolved_in(),
            definition: lookup.definition(),
        })
    }

    /// Resolves `token` and keeps the instance record for
    /// [`Destroyable::destroy`].
    pub fn get_destroyable(&self, token: impl Into<Token>, hooks: Vec<Arc<dyn Hook>>) -> Resolution<Destroyable> {
        let session = Session::new(token.into(), self.clone(), hooks, None, None);
        session.retain();
        let events = self.events().clone();
        let observed = session.clone();
        self.run_session(session)
            .map(move |value| Destroyable::new(value, observed.instance(), events))
    }

    /// Resolves `arguments`, calls `f`, then tears the arguments down as
    /// consumed. Scopes that outlive a call refuse that teardown.
    pub fn call<R, F>(&self, arguments: Vec<InjectionArgument>, f: F) -> Resolution<R>
    where
        R: Send + 'static,
        F: FnOnce(Args) -> Result<R> + Send + 'static,
    {
        let sessions: Vec<Session> = arguments
            .into_iter()
            .enumerate()
            .map(|(index, argument)| {
                let session = Session::new(
                    argument.token,
                    self.clone(),
                    argument.hooks,
                    None,
                    Some(InjectionSite::Function(index)),
                );
                session.retain();
                session
            })
            .collect();
        let resolutions = sessions.iter().map(|s| self.run_session(s.clone())).collect();
        let events = self.events().clone();

        Resolution::join_all(resolutions).and_then(move |values| {
            let outcome = f(Args::new(Token::named("call"), values));
            let consumed: Vec<_> = sessions
                .iter()
                .filter_map(Session::instance)
                .map(|record| teardown(record, DestroyEvent::Manual, events.clone()))
                .collect();
            Resolution::join_all(consumed).then(move |torn| {
                Resolution::from(outcome.and_then(|value| torn.map(|_| value)))
            })
        })
    }

    /// An accessor for values keyed by a runtime object.
    pub fn accessor<T: Any + Send + Sync>(&self, token: impl Into<Token>) -> Accessor<T> {
        Accessor {
            injector: self.clone(),
            token: token.into(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn inject(
        &self,
        token: Token,
        hooks: Vec<Arc<dyn Hook>>,
        parent: Option<Session>,
        site: Option<InjectionSite>,
    ) -> Resolution<Value> {
        self.run_session(Session::new(token, self.clone(), hooks, parent, site))
    }

    /// Runs the session's own hooks around lookup and construction.
    pub(crate) fn run_session(&self, session: Session) -> Resolution<Value> {
        if let Err(error) = self.ensure_alive() {
            return Resolution::err(error);
        }
        let hooks = session.hooks().to_vec();
        run_hooks(&hooks, session, Next::new(resolve::resolve_session))
    }

    // ═══════════════════════════════════════════
    // Teardown
    // ═══════════════════════════════════════════

    /// Tears down the instance holding `value`, searched here and in the
    /// parent chain.
    pub fn destroy_instance(&self, value: &Value) -> Resolution<()> {
        let mut current = Some(self.clone());
        while let Some(injector) = current {
            let found = injector
                .0
                .registry
                .definitions()
                .into_iter()
                .flat_map(|definition| definition.instances())
                .find(|record| record.value().is_some_and(|held| same_value(&held, value)));
            if let Some(record) = found {
                return teardown(record, DestroyEvent::Manual, self.events().clone());
            }
            current = injector.parent();
        }
        Resolution::ok(())
    }

    /// Destroys child injectors, then every instance of this one.
    ///
    /// Calling it again is a no-op. Afterwards every request fails with
    /// [`GraftError::InjectorDestroyed`].
    pub fn destroy(&self) -> Resolution<()> {
        if self.0.destroyed.swap(true, Ordering::AcqRel) {
            return Resolution::ok(());
        }
        info!(injector = %self.name(), "Destroying injector");

        let mut first: Vec<Resolution<()>> = self
            .0
            .deferred
            .lock()
            .drain(..)
            .map(Resolution::Pending)
            .collect();
        let owned: Vec<Injector> = self.0.owned.lock().drain(..).collect();
        let children: Vec<Injector> = self
            .0
            .children
            .lock()
            .drain(..)
            .filter_map(|child| child.upgrade())
            .collect();
        first.extend(owned.iter().chain(children.iter()).map(Injector::destroy));

        let this = self.clone();
        Resolution::join_all(first).then(move |earlier| {
            let own: Vec<_> = this
                .0
                .registry
                .definitions()
                .into_iter()
                .flat_map(|definition| definition.instances())
                .map(|record| teardown(record, DestroyEvent::Injector, this.events().clone()))
                .collect();
            Resolution::join_all(own).then(move |result| {
                this.events().emit(&LifecycleEvent::InjectorDestroyed {
                    injector: this.name().to_string(),
                });
                debug!(injector = %this.name(), "Injector destroyed");
                Resolution::from(earlier.and(result).map(|_| ()))
            })
        })
    }

    // ═══════════════════════════════════════════
    // Diagnostics
    // ═══════════════════════════════════════════

    /// A serializable description of this injector and the ones below it.
    pub fn snapshot(&self) -> InjectorSnapshot {
        let mut providers: Vec<ProviderSnapshot> = self
            .0
            .registry
            .definitions()
            .iter()
            .map(|definition| ProviderSnapshot {
                token: definition.token().to_string(),
                recipe: definition.recipe().kind(),
                scope: definition.scope_name(),
                name: definition.annotations().name.as_deref().map(str::to_string),
                visibility: definition.annotations().visibility,
                multi: definition.is_multi(),
                instances: definition.instances().len(),
            })
            .collect();
        providers.sort_by(|a, b| a.token.cmp(&b.token));

        let mut exports: Vec<String> = self.0.exports.read().iter().map(Token::to_string).collect();
        exports.sort();

        let owned: Vec<Injector> = self.0.owned.lock().clone();
        let children: Vec<Injector> = self
            .0
            .children
            .lock()
            .iter()
            .filter_map(WeakInjector::upgrade)
            .collect();

        InjectorSnapshot {
            name: self.name().to_string(),
            providers,
            imports: self.imports().iter().map(|i| i.name().to_string()).collect(),
            exports,
            children: owned.iter().chain(children.iter()).map(Injector::snapshot).collect(),
        }
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("providers", &self.0.registry.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Result of [`Injector::inspect`].
#[derive(Debug, Clone)]
pub struct Inspection {
    pub token: Token,
    /// The injector whose registry answered; `None` when a hook absorbed
    /// the miss.
    pub injector: Option<Injector>,
    pub definition: Option<Arc<DefinitionRecord>>,
}

/// Resolves a token for a given runtime object. See
/// [`DynamicScope`](crate::scope::DynamicScope).
pub struct Accessor<T> {
    injector: Injector,
    token: Token,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Accessor<T> {
    pub fn resolve(&self, object: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>> {
        self.injector
            .get_as::<T>(self.token.clone(), vec![hooks::with_object(object)])
    }

    pub async fn resolve_async(&self, object: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>> {
        let value = self
            .injector
            .get(self.token.clone(), vec![hooks::with_object(object)])
            .await?;
        downcast::<T>(&self.token, value)
    }

    pub fn token(&self) -> &Token {
        &self.token
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor").field("token", &self.token).finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InjectorSnapshot {
    pub name: String,
    pub providers: Vec<ProviderSnapshot>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub children: Vec<InjectorSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderSnapshot {
    pub token: String,
    pub recipe: &'static str,
    /// Known once the first instance was built.
    pub scope: Option<String>,
    pub name: Option<String>,
    pub visibility: Visibility,
    pub multi: bool,
    pub instances: usize,
}

// ═══════════════════════════════════════════
// InjectorBuilder
// ═══════════════════════════════════════════

/// Builds a root or child [`Injector`] with providers, plugins and modules.
///
/// ```rust
/// use graft_container::prelude::*;
///
/// let settings = InjectorSettings { allow_override: false, ..Default::default() };
/// let injector = Injector::builder()
///     .name("app")
///     .settings(settings)
///     .provider(ProviderDescriptor::value("port", 8080u16))
///     .build()?;
///
/// assert_eq!(*injector.get_as::<u16>("port", vec![])?, 8080);
/// assert!(injector.provide(ProviderDescriptor::value("port", 9090u16)).is_err());
/// # Ok::<(), graft_container::GraftError>(())
/// ```
#[derive(Default)]
pub struct InjectorBuilder {
    name: Option<String>,
    settings: InjectorSettings,
    parent: Option<Injector>,
    providers: Vec<ProviderDescriptor>,
    plugins: Vec<Arc<dyn Plugin>>,
    modules: Vec<Module>,
}

impl InjectorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Ignored when a parent is set: children share their root's settings.
    pub fn settings(mut self, settings: InjectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn parent(mut self, parent: &Injector) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn provider(mut self, descriptor: ProviderDescriptor) -> Self {
        self.providers.push(descriptor);
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// # Errors
    /// Registration errors, and [`GraftError::AsyncModule`] when a module
    /// graph contains a lazily loaded module.
    pub fn build(self) -> Result<Injector> {
        let (injector, modules) = self.prepare()?;
        for module in &modules {
            ModuleResolver::new().install(&injector, module)?;
        }
        Ok(injector)
    }

    /// Like [`build`](InjectorBuilder::build), loading lazy modules first.
    pub async fn build_async(self) -> Result<Injector> {
        let (injector, modules) = self.prepare()?;
        for module in &modules {
            ModuleResolver::preload(module).await?.install(&injector, module)?;
        }
        Ok(injector)
    }

    fn prepare(self) -> Result<(Injector, Vec<Module>)> {
        let name = self.name.as_deref().unwrap_or("root");
        let injector = match &self.parent {
            Some(parent) => {
                for plugin in &self.plugins {
                    plugin.install(parent.events());
                }
                parent.child(name)
            }
            None => {
                let injector = Injector::root(name, self.settings, Arc::new(EventBus::new()));
                for plugin in &self.plugins {
                    debug!(plugin = plugin.name(), "Installing plugin");
                    plugin.install(injector.events());
                }
                injector.announce();
                injector
            }
        };
        for descriptor in self.providers {
            injector.provide(descriptor)?;
        }
        Ok((injector, self.modules))
    }
}

impl fmt::Debug for InjectorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorBuilder")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("providers", &self.providers.len())
            .field("plugins", &self.plugins.len())
            .field("modules", &self.modules.len())
            .finish()
    }
}
