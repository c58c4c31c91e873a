//! Resolution engine for Graft dependency injection.
//!
//! Providers are registered as [`ProviderDescriptor`](descriptor::ProviderDescriptor)s
//! in an [`Injector`](injector::Injector); requests flow through hooks, a
//! hierarchical lookup, a scope strategy and a factory, and are cached as
//! instance records that are torn down in dependency order.

pub mod annotations;
pub mod auto;
pub mod context;
pub mod descriptor;
pub mod destroy;
pub mod error;
pub mod events;
mod factory;
pub mod hooks;
pub mod injector;
pub mod module;
pub mod pipeline;
pub mod record;
mod registry;
pub mod resolution;
pub mod scope;
pub mod session;
pub mod settings;
pub mod token;

#[doc(hidden)]
pub use inventory;

pub use error::{GraftError, Result};
pub use injector::Injector;
pub use resolution::{Resolution, Value};
pub use scope::Scope;
pub use token::Token;

pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::annotations::{Constraint, ScopeBoundary, Visibility};
    pub use crate::context::Context;
    pub use crate::descriptor::{Absent, Args, InjectionArgument, Late, OnDestroy, ProviderDescriptor};
    pub use crate::destroy::{DestroyEvent, Destroyable, destroy};
    pub use crate::error::{GraftError, Result};
    pub use crate::events::{EventBus, LifecycleEvent, Plugin};
    pub use crate::hooks;
    pub use crate::injector::{Injector, InjectorBuilder};
    pub use crate::module::{ForwardModule, LazyModule, Module};
    pub use crate::pipeline::{Hook, Next};
    pub use crate::resolution::{Resolution, Value};
    pub use crate::scope::{Scope, ScopeRef, ScopeStrategy};
    pub use crate::session::Session;
    pub use crate::settings::InjectorSettings;
    pub use crate::token::Token;
}
