//! Built-in hooks.
//!
//! Each constructor returns an `Arc<dyn Hook>` ready to pass to `get` or to
//! attach to a descriptor or injection argument.
//!
//! | Hook | Effect |
//! |------|--------|
//! | [`optional`] | missing token yields [`Absent`] instead of an error |
//! | [`optional_or`] | missing token yields a default value |
//! | [`fallback`] | missing token resolves another token |
//! | [`skip_self`] | start lookup in the parent injector |
//! | [`self_only`] | fail unless the current injector resolves the token |
//! | [`named`] / [`tagged`] | select annotated definitions |
//! | [`with_context`] | supply an explicit context to the scope |
//! | [`with_object`] | supply the runtime object for dynamic scopes |
//! | [`new_instance`] | bypass the cache for a fresh identity |
//! | [`memo`] | remember the first result |
//! | [`transform`] | post-process the value |

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::descriptor::Absent;
use crate::error::Result;
use crate::pipeline::{Hook, Next};
use crate::resolution::{Resolution, Value};
use crate::session::Session;
use crate::token::Token;

/// Wraps a closure as a hook.
pub fn hook(f: impl Fn(Session, Next) -> Resolution<Value> + Send + Sync + 'static) -> Arc<dyn Hook> {
    Arc::new(f)
}

// ── Lookup failures ──

/// Absorbs "not found" for the requested token.
#[derive(Clone, Default)]
pub struct Optional {
    default: Option<Value>,
}

impl Hook for Optional {
    fn handle(&self, session: Session, next: Next) -> Resolution<Value> {
        let token = session.token().clone();
        let default = self.default.clone();
        next.run(session).then(move |result| match result {
            Err(error) if error.is_not_found() && error.token() == Some(&token) => {
                Resolution::ok(default.unwrap_or_else(|| Arc::new(Absent) as Value))
            }
            other => Resolution::from(other),
        })
    }
}

/// A missing token resolves to [`Absent`].
pub fn optional() -> Arc<dyn Hook> {
    Arc::new(Optional::default())
}

/// A missing token resolves to `value`.
pub fn optional_or<T: Any + Send + Sync>(value: T) -> Arc<dyn Hook> {
    Arc::new(Optional {
        default: Some(Arc::new(value)),
    })
}

/// A missing token resolves `token` instead, from the same injector.
pub fn fallback(token: impl Into<Token>) -> Arc<dyn Hook> {
    let fallback = token.into();
    hook(move |session: Session, next: Next| {
        let fallback = fallback.clone();
        let retry = session.clone();
        next.run(session).then(move |result| match result {
            Err(error) if error.is_not_found() && error.token() == Some(retry.token()) => {
                retry.injector().inject(
                    fallback,
                    Vec::new(),
                    retry.parent().cloned(),
                    retry.site().cloned(),
                )
            }
            other => Resolution::from(other),
        })
    })
}

// ── Injector selection ──

/// Starts lookup in the parent of the current injector.
pub fn skip_self() -> Arc<dyn Hook> {
    hook(|session: Session, next: Next| match session.injector().parent() {
        Some(parent) => {
            session.set_injector(parent);
            next.run(session)
        }
        None => Resolution::err(session.not_found()),
    })
}

/// Fails with "not found" unless the current injector itself resolves the
/// token. A dry run discovers where lookup would land first.
pub fn self_only() -> Arc<dyn Hook> {
    hook(|session: Session, next: Next| {
        let here = session.injector();
        let lookup = session.dry_run();
        next.run(lookup.clone()).and_then(move |_| {
            match lookup.resolved_in() {
                Some(found) if found.id() == here.id() => next.run(session),
                _ => Resolution::err(session.not_found()),
            }
        })
    })
}

/// Searches only what the current injector imports and its parents; used
/// for re-exported tokens.
pub(crate) fn imported_only() -> Arc<dyn Hook> {
    hook(|session: Session, next: Next| {
        session.skip_local();
        next.run(session)
    })
}

// ── Request options ──

pub fn named(name: impl Into<Arc<str>>) -> Arc<dyn Hook> {
    let name = name.into();
    hook(move |session: Session, next: Next| {
        session.set_name(name.clone());
        next.run(session)
    })
}

pub fn tagged(tag: impl Into<Arc<str>>) -> Arc<dyn Hook> {
    let tag = tag.into();
    hook(move |session: Session, next: Next| {
        session.add_tag(tag.clone());
        next.run(session)
    })
}

/// Supplies an explicit context. Scopes that cannot be overridden reject
/// a non-static one.
pub fn with_context(context: Context) -> Arc<dyn Hook> {
    hook(move |session: Session, next: Next| {
        session.set_explicit_context(context);
        next.run(session)
    })
}

/// Supplies the runtime object that keys dynamic-scoped instances.
pub fn with_object(object: Arc<dyn Any + Send + Sync>) -> Arc<dyn Hook> {
    hook(move |session: Session, next: Next| {
        session.set_object(object.clone());
        next.run(session)
    })
}

/// Builds a fresh instance regardless of scope.
pub fn new_instance() -> Arc<dyn Hook> {
    hook(|session: Session, next: Next| {
        session.mark_fresh();
        session.mark_side_effects();
        next.run(session)
    })
}

// ── Results ──

/// Remembers the first result; later requests skip the chain. Results of
/// side-effecting resolutions are not remembered.
#[derive(Clone, Default)]
pub struct Memo {
    cached: Arc<Mutex<Option<Value>>>,
}

impl Hook for Memo {
    fn handle(&self, session: Session, next: Next) -> Resolution<Value> {
        if session.is_dry_run() {
            return next.run(session);
        }
        if let Some(value) = self.cached.lock().clone() {
            return Resolution::ok(value);
        }
        let cached = self.cached.clone();
        let observed = session.clone();
        next.run(session).map(move |value| {
            if !observed.flags().side_effects {
                *cached.lock() = Some(value.clone());
            }
            value
        })
    }
}

pub fn memo() -> Arc<dyn Hook> {
    Arc::new(Memo::default())
}

/// Post-processes the resolved value.
pub fn transform(f: impl Fn(&Session, Value) -> Result<Value> + Send + Sync + 'static) -> Arc<dyn Hook> {
    let f = Arc::new(f);
    hook(move |session: Session, next: Next| {
        if session.is_dry_run() {
            return next.run(session);
        }
        let f = f.clone();
        let observed = session.clone();
        next.run(session).and_then(move |value| Resolution::from(f(&observed, value)))
    })
}
