//! Scope strategies: which instance a request gets, and when it may die.
//!
//! A strategy picks the [`Context`] that, together with the definition, keys
//! the instance cache. It also approves or refuses teardown for each
//! [`DestroyEvent`].
//!
//! Built-in strategies:
//! - [`SingletonScope`]: always [`Context::STATIC`]
//! - [`TransientScope`]: a fresh context per request
//! - [`DefaultScope`]: the caller's context when given, else static
//! - [`InstanceScope`]: one context per top-level resolution graph
//! - [`LocalScope`]: the context of the nearest (or farthest, or n-th)
//!   ancestor marked as a boundary
//! - [`DynamicScope`]: one context per runtime object, weakly held

mod default;
mod dynamic;
mod instance;
mod local;
mod singleton;
mod transient;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use default::DefaultScope;
pub use dynamic::DynamicScope;
pub use instance::InstanceScope;
pub use local::{Boundary, DepthPolicy, LocalScope};
pub use singleton::SingletonScope;
pub use transient::TransientScope;

use crate::context::Context;
use crate::destroy::DestroyEvent;
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::session::Session;
use crate::token::Token;

/// Policy for identity and teardown of instances.
pub trait ScopeStrategy: Send + Sync + 'static {
    /// Display name used in diagnostics.
    fn name(&self) -> &str;

    /// The cache key for this request.
    fn context(&self, session: &Session) -> Resolution<Context>;

    /// Whether `instance` may be torn down for `event`. Parent references
    /// are checked separately.
    fn should_destroy(&self, instance: &InstanceRecord, event: DestroyEvent) -> bool;

    /// Whether an explicitly supplied non-static context is acceptable.
    fn can_be_overridden(&self, _session: &Session) -> bool {
        true
    }

    /// Whether a later request can select `context` again. Top-level
    /// instances in contexts nobody can reach are handed to the caller
    /// instead of being cached.
    fn is_reusable(&self, _context: Context, _session: &Session) -> bool {
        true
    }

    /// Called once for every instance created in a context of this scope.
    fn on_instance(&self, _instance: &Arc<InstanceRecord>) {}
}

/// The built-in scopes that need no configuration.
///
/// # Examples
/// ```
/// use graft_container::scope::Scope;
///
/// assert_eq!(Scope::default(), Scope::Default);
/// assert_eq!(Scope::Singleton.to_string(), "Singleton");
/// assert_eq!(Scope::Transient.strategy().name(), "Transient");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Default,
    Singleton,
    Transient,
    Instance,
    Dynamic,
}

static SINGLETON: Lazy<Arc<dyn ScopeStrategy>> = Lazy::new(|| Arc::new(SingletonScope));
static TRANSIENT: Lazy<Arc<dyn ScopeStrategy>> = Lazy::new(|| Arc::new(TransientScope::new()));
static DEFAULT: Lazy<Arc<dyn ScopeStrategy>> = Lazy::new(|| Arc::new(DefaultScope));
static INSTANCE: Lazy<Arc<dyn ScopeStrategy>> = Lazy::new(|| Arc::new(InstanceScope));
static DYNAMIC: Lazy<Arc<dyn ScopeStrategy>> = Lazy::new(|| Arc::new(DynamicScope::new()));

impl Scope {
    /// The shared strategy for this scope.
    pub fn strategy(self) -> Arc<dyn ScopeStrategy> {
        match self {
            Scope::Default => DEFAULT.clone(),
            Scope::Singleton => SINGLETON.clone(),
            Scope::Transient => TRANSIENT.clone(),
            Scope::Instance => INSTANCE.clone(),
            Scope::Dynamic => DYNAMIC.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Default => "Default",
            Scope::Singleton => "Singleton",
            Scope::Transient => "Transient",
            Scope::Instance => "Instance",
            Scope::Dynamic => "Dynamic",
        };
        f.write_str(name)
    }
}

/// A descriptor's scope: a strategy object, or a token whose provider
/// resolves to `Arc<dyn ScopeStrategy>`.
#[derive(Clone)]
pub enum ScopeRef {
    Strategy(Arc<dyn ScopeStrategy>),
    Provider(Token),
}

impl ScopeRef {
    pub fn strategy(strategy: impl ScopeStrategy) -> Self {
        Self::Strategy(Arc::new(strategy))
    }
}

impl From<Scope> for ScopeRef {
    fn from(scope: Scope) -> Self {
        Self::Strategy(scope.strategy())
    }
}

impl From<Arc<dyn ScopeStrategy>> for ScopeRef {
    fn from(strategy: Arc<dyn ScopeStrategy>) -> Self {
        Self::Strategy(strategy)
    }
}

impl From<Token> for ScopeRef {
    fn from(token: Token) -> Self {
        Self::Provider(token)
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRef::Strategy(strategy) => write!(f, "Strategy({})", strategy.name()),
            ScopeRef::Provider(token) => write!(f, "Provider({token})"),
        }
    }
}
