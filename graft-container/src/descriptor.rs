//! Normalized provider descriptors.
//!
//! A [`ProviderDescriptor`] is everything an injector needs to register a
//! recipe: the token, how to build the value ([`Recipe`]), the scope, hooks,
//! annotations, an optional constraint and an optional teardown action.
//! Descriptors are plain data built with chained methods; attribute or
//! decorator front-ends would produce the same structure.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use graft_container::prelude::*;
//!
//! struct Config { url: String }
//! struct Database { url: String }
//!
//! let config = ProviderDescriptor::value(Token::of::<Config>(), Config { url: "pg://".into() });
//! let database = ProviderDescriptor::class(Token::of::<Database>(), |args| {
//!     let config = args.get::<Config>(0)?;
//!     Ok(Database { url: config.url.clone() })
//! })
//! .inject(Token::of::<Config>())
//! .scope(Scope::Singleton);
//! # let _ = (config, database);
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::annotations::{Annotations, Constraint, Visibility};
use crate::error::{GraftError, Result};
use crate::pipeline::Hook;
use crate::resolution::{Resolution, Value, downcast};
use crate::scope::ScopeRef;
use crate::token::Token;

/// Synchronous constructor over resolved arguments.
pub type Constructor = Arc<dyn Fn(&Args) -> Result<Value> + Send + Sync>;

/// Factory over resolved arguments; may finish later.
pub type FactoryFn = Arc<dyn Fn(Args) -> Resolution<Value> + Send + Sync>;

/// How a definition produces its value.
#[derive(Clone)]
pub enum Recipe {
    /// Construct synchronously, then fill properties and methods.
    Class {
        constructor: Constructor,
        plan: InjectionPlan,
    },
    /// Build through a factory that may be asynchronous.
    Factory { factory: FactoryFn, plan: InjectionPlan },
    /// A fixed value.
    Value(Value),
    /// Alias to another token.
    Existing(Token),
}

impl Recipe {
    pub fn kind(&self) -> &'static str {
        match self {
            Recipe::Class { .. } => "class",
            Recipe::Factory { .. } => "factory",
            Recipe::Value(_) => "value",
            Recipe::Existing(_) => "existing",
        }
    }

    pub(crate) fn plan_mut(&mut self) -> Option<&mut InjectionPlan> {
        match self {
            Recipe::Class { plan, .. } | Recipe::Factory { plan, .. } => Some(plan),
            Recipe::Value(_) | Recipe::Existing(_) => None,
        }
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipe::Existing(target) => write!(f, "Existing({target:?})"),
            Recipe::Class { plan, .. } | Recipe::Factory { plan, .. } => f
                .debug_struct(self.kind())
                .field("parameters", &plan.parameters.len())
                .field("properties", &plan.properties.len())
                .field("methods", &plan.methods.len())
                .finish(),
            Recipe::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// One dependency to resolve: a token plus the hooks applied at this site.
#[derive(Clone)]
pub struct InjectionArgument {
    pub token: Token,
    pub hooks: Vec<Arc<dyn Hook>>,
}

impl InjectionArgument {
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            hooks: Vec::new(),
        }
    }

    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl From<Token> for InjectionArgument {
    fn from(token: Token) -> Self {
        Self::new(token)
    }
}

impl From<&str> for InjectionArgument {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for InjectionArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionArgument")
            .field("token", &self.token)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

type PropertySetter = Arc<dyn Fn(&Value, Value) -> Result<()> + Send + Sync>;
type MethodCall = Arc<dyn Fn(&Value, Args) -> Result<()> + Send + Sync>;

/// A dependency written into an already allocated instance.
#[derive(Clone)]
pub struct PropertyInjection {
    pub name: Arc<str>,
    pub argument: InjectionArgument,
    pub(crate) apply: PropertySetter,
}

/// A method invoked on an allocated instance with resolved arguments.
#[derive(Clone)]
pub struct MethodInjection {
    pub name: Arc<str>,
    pub arguments: Vec<InjectionArgument>,
    pub(crate) apply: MethodCall,
}

/// Constructor parameters plus post-allocation injections.
#[derive(Clone, Default)]
pub struct InjectionPlan {
    pub parameters: Vec<InjectionArgument>,
    pub properties: Vec<PropertyInjection>,
    pub methods: Vec<MethodInjection>,
}

impl InjectionPlan {
    /// Overlays `derived` onto a copy of this plan.
    ///
    /// Parameters are replaced slot by slot; properties and methods are
    /// replaced by name, and new names are appended.
    pub fn overlay(&self, derived: &InjectionPlan) -> InjectionPlan {
        let mut merged = self.clone();

        for (index, parameter) in derived.parameters.iter().enumerate() {
            match merged.parameters.get_mut(index) {
                Some(slot) => *slot = parameter.clone(),
                None => merged.parameters.push(parameter.clone()),
            }
        }

        for property in &derived.properties {
            match merged.properties.iter_mut().find(|p| p.name == property.name) {
                Some(slot) => *slot = property.clone(),
                None => merged.properties.push(property.clone()),
            }
        }

        for method in &derived.methods {
            match merged.methods.iter_mut().find(|m| m.name == method.name) {
                Some(slot) => *slot = method.clone(),
                None => merged.methods.push(method.clone()),
            }
        }

        merged
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.properties.is_empty() && self.methods.is_empty()
    }
}

/// Marker value produced when an optional dependency is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Absent;

/// Resolved arguments handed to constructors, factories and methods.
#[derive(Clone)]
pub struct Args {
    token: Token,
    values: Vec<Value>,
}

impl Args {
    pub(crate) fn new(token: Token, values: Vec<Value>) -> Self {
        Self { token, values }
    }

    /// The argument at `index`, downcast to `T`.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
        let value = self.value(index).cloned().ok_or_else(|| self.missing(index))?;
        downcast::<T>(&self.token, value)
    }

    /// Like [`get`](Args::get), with `None` for an absent optional argument.
    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>> {
        match self.value(index) {
            Some(value) if value.is::<Absent>() => Ok(None),
            Some(_) => self.get::<T>(index).map(Some),
            None => Err(self.missing(index)),
        }
    }

    /// Every value of a multi-provider argument, downcast to `T`.
    pub fn all<T: Any + Send + Sync>(&self, index: usize) -> Result<Vec<Arc<T>>> {
        let values = self.get::<Vec<Value>>(index)?;
        values
            .iter()
            .map(|value| downcast::<T>(&self.token, value.clone()))
            .collect()
    }

    #[inline]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn missing(&self, index: usize) -> GraftError {
        GraftError::construction(
            &self.token,
            format!("argument {index} was not declared ({} resolved)", self.values.len()),
        )
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("token", &self.token)
            .field("len", &self.values.len())
            .finish()
    }
}

/// A slot filled after allocation, used to close dependency cycles.
///
/// ```
/// use std::sync::Arc;
/// use graft_container::descriptor::Late;
///
/// struct Node { next: Late<Node> }
///
/// let a = Arc::new(Node { next: Late::new() });
/// assert!(a.next.get().is_none());
/// assert!(a.next.set(a.clone()));
/// assert!(Arc::ptr_eq(a.next.get().unwrap(), &a));
/// ```
pub struct Late<T>(OnceCell<Arc<T>>);

impl<T> Late<T> {
    pub const fn new() -> Self {
        Self(OnceCell::new())
    }

    /// Fills the slot; `false` when it was already filled.
    pub fn set(&self, value: Arc<T>) -> bool {
        self.0.set(value).is_ok()
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.0.get()
    }
}

impl<T> Default for Late<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Late<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(_) => f.write_str("Late(set)"),
            None => f.write_str("Late(unset)"),
        }
    }
}

/// Teardown action run once when an instance is destroyed.
#[derive(Clone)]
pub struct OnDestroy(Arc<dyn Fn(Value) -> Resolution<()> + Send + Sync>);

impl OnDestroy {
    /// Runs over the type-erased value.
    pub fn sync(action: impl Fn(Value) -> Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(move |value| Resolution::Ready(action(value))))
    }

    /// Runs over the value downcast to `T`.
    pub fn typed<T: Any + Send + Sync>(
        action: impl Fn(&T) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(move |value| {
            let token = Token::of::<T>();
            Resolution::Ready(downcast::<T>(&token, value).and_then(|v| action(&v)))
        }))
    }

    /// Runs a future-returning action.
    pub fn future<F, Fut>(action: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |value| Resolution::pending(action(value))))
    }

    /// Calls [`AsyncDestroy::destroy`] on values of type `T`.
    #[cfg(feature = "async")]
    pub fn async_destroy<T: AsyncDestroy>() -> Self {
        Self(Arc::new(|value| {
            let token = Token::of::<T>();
            match downcast::<T>(&token, value) {
                Ok(instance) => Resolution::pending(async move { instance.destroy().await }),
                Err(error) => Resolution::err(error),
            }
        }))
    }

    pub(crate) fn run(&self, value: Value) -> Resolution<()> {
        (self.0)(value)
    }
}

impl fmt::Debug for OnDestroy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnDestroy(..)")
    }
}

/// Asynchronous teardown implemented by the instance itself.
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncDestroy: Any + Send + Sync {
    async fn destroy(&self) -> Result<()>;
}

/// Everything needed to register one definition.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub token: Token,
    pub recipe: Recipe,
    /// `None` uses the injector's default scope.
    pub scope: Option<ScopeRef>,
    /// Definition-level hooks, innermost around instantiation.
    pub hooks: Vec<Arc<dyn Hook>>,
    pub annotations: Annotations,
    pub constraint: Option<Constraint>,
    pub on_destroy: Option<OnDestroy>,
}

impl ProviderDescriptor {
    pub fn new(token: impl Into<Token>, recipe: Recipe) -> Self {
        Self {
            token: token.into(),
            recipe,
            scope: None,
            hooks: Vec::new(),
            annotations: Annotations::default(),
            constraint: None,
            on_destroy: None,
        }
    }

    /// A fixed value.
    pub fn value<T: Any + Send + Sync>(token: impl Into<Token>, value: T) -> Self {
        Self::new(token, Recipe::Value(Arc::new(value)))
    }

    /// A synchronous constructor. Declare its parameters with
    /// [`inject`](ProviderDescriptor::inject).
    pub fn class<T, F>(token: impl Into<Token>, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Args) -> Result<T> + Send + Sync + 'static,
    {
        let constructor: Constructor =
            Arc::new(move |args| constructor(args).map(|v| Arc::new(v) as Value));
        Self::new(
            token,
            Recipe::Class {
                constructor,
                plan: InjectionPlan::default(),
            },
        )
    }

    /// A factory returning a [`Resolution`], ready or pending.
    pub fn factory<T, F>(token: impl Into<Token>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Args) -> Resolution<T> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Arc::new(move |args| factory(args).map(|v| Arc::new(v) as Value));
        Self::new(
            token,
            Recipe::Factory {
                factory,
                plan: InjectionPlan::default(),
            },
        )
    }

    /// A factory returning a future.
    pub fn factory_async<T, F, Fut>(token: impl Into<Token>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::factory(token, move |args| Resolution::pending(factory(args)))
    }

    /// An alias resolving `target` instead.
    pub fn existing(token: impl Into<Token>, target: impl Into<Token>) -> Self {
        Self::new(token, Recipe::Existing(target.into()))
    }

    // ── Injection plan ──

    /// Appends a constructor parameter.
    pub fn inject(self, argument: impl Into<InjectionArgument>) -> Self {
        let argument = argument.into();
        self.with_plan(|plan| plan.parameters.push(argument))
    }

    /// Writes a dependency into the allocated instance through `setter`.
    pub fn property<T, D, F>(self, name: &str, argument: impl Into<InjectionArgument>, setter: F) -> Self
    where
        T: Any + Send + Sync,
        D: Any + Send + Sync,
        F: Fn(&T, Arc<D>) + Send + Sync + 'static,
    {
        let token = self.token.clone();
        let apply: PropertySetter = Arc::new(move |target, value| {
            let target = downcast::<T>(&token, target.clone())?;
            setter(&target, downcast::<D>(&token, value)?);
            Ok(())
        });
        let property = PropertyInjection {
            name: name.into(),
            argument: argument.into(),
            apply,
        };
        self.with_plan(|plan| plan.properties.push(property))
    }

    /// Calls `method` on the allocated instance with resolved arguments.
    pub fn method<T, F>(self, name: &str, arguments: Vec<InjectionArgument>, method: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &Args) -> Result<()> + Send + Sync + 'static,
    {
        let token = self.token.clone();
        let apply: MethodCall = Arc::new(move |target, args| {
            let target = downcast::<T>(&token, target.clone())?;
            method(&target, &args)
        });
        let injection = MethodInjection {
            name: name.into(),
            arguments,
            apply,
        };
        self.with_plan(|plan| plan.methods.push(injection))
    }

    /// Overlays `derived` onto the current plan (see [`InjectionPlan::overlay`]).
    pub fn plan(self, derived: &InjectionPlan) -> Self {
        self.with_plan(|plan| *plan = plan.overlay(derived))
    }

    fn with_plan(mut self, edit: impl FnOnce(&mut InjectionPlan)) -> Self {
        if let Some(plan) = self.recipe.plan_mut() {
            edit(plan);
        }
        self
    }

    // ── Scope, hooks, annotations ──

    pub fn scope(mut self, scope: impl Into<ScopeRef>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.annotations.name = Some(name.into());
        self
    }

    pub fn tagged(mut self, tag: impl Into<Arc<str>>) -> Self {
        self.annotations.tags.push(tag.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.annotations.visibility = Visibility::Private;
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.annotations.order = order;
        self
    }

    pub fn multi(mut self) -> Self {
        self.annotations.multi = true;
        self
    }

    pub fn component(mut self) -> Self {
        self.annotations.component = true;
        self
    }

    /// Attaches a typed annotation extension.
    pub fn annotate<T: Any + Clone + Send + Sync>(mut self, value: T) -> Self {
        self.annotations.insert(value);
        self
    }

    pub fn when(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn on_destroy(mut self, action: OnDestroy) -> Self {
        self.on_destroy = Some(action);
        self
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("token", &self.token)
            .field("recipe", &self.recipe)
            .field("scope", &self.scope)
            .field("hooks", &self.hooks.len())
            .field("annotations", &self.annotations)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(plan: &InjectionPlan) -> Vec<Token> {
        plan.parameters.iter().map(|p| p.token.clone()).collect()
    }

    #[test]
    fn overlay_replaces_slots_and_appends() {
        let base = ProviderDescriptor::class(Token::named("base"), |_| Ok(()))
            .inject(Token::named("a"))
            .inject(Token::named("b"));
        let derived = ProviderDescriptor::class(Token::named("derived"), |_| Ok(()))
            .inject(Token::named("x"))
            .property::<(), u8, _>("extra", Token::named("e"), |_, _| {});

        let (Recipe::Class { plan: base, .. }, Recipe::Class { plan: derived, .. }) =
            (base.recipe, derived.recipe)
        else {
            panic!("class recipes expected");
        };

        let merged = base.overlay(&derived);
        assert_eq!(params(&merged), vec![Token::named("x"), Token::named("b")]);
        assert_eq!(merged.properties.len(), 1);
        assert_eq!(&*merged.properties[0].name, "extra");
    }

    #[test]
    fn args_downcast_and_absent() {
        let args = Args::new(
            Token::named("consumer"),
            vec![Arc::new(7u32) as Value, Arc::new(Absent) as Value],
        );
        assert_eq!(*args.get::<u32>(0).unwrap(), 7);
        assert!(args.optional::<String>(1).unwrap().is_none());
        assert!(matches!(
            args.get::<String>(0),
            Err(GraftError::TypeMismatch { .. })
        ));
        assert!(args.get::<u32>(5).is_err());
    }

    #[test]
    fn value_plans_ignore_injection() {
        let descriptor = ProviderDescriptor::value("answer", 42u8).inject(Token::named("ignored"));
        assert!(matches!(descriptor.recipe, Recipe::Value(_)));
    }

    #[test]
    fn annotations_builder() {
        let descriptor = ProviderDescriptor::value("cache", ())
            .named("primary")
            .tagged("fast")
            .order(3)
            .private()
            .multi();
        assert_eq!(descriptor.annotations.name.as_deref(), Some("primary"));
        assert!(descriptor.annotations.has_tag("fast"));
        assert_eq!(descriptor.annotations.order, 3);
        assert_eq!(descriptor.annotations.visibility, Visibility::Private);
        assert!(descriptor.annotations.multi);
    }
}
