//! The resolution engine.
//!
//! ```text
//! session ─> lookup ─> definition hooks ─> scope context ─> instance cache
//!                                                              │ miss
//!                                                              ▼
//!                                                       factory::construct
//! ```
//!
//! Everything returns a [`Resolution`]: a graph stays synchronous until a
//! hook, a scope or a factory hands back a future.

use std::sync::Arc;

use futures::FutureExt;
use graft_support::rendering::suggest_similar;
use tracing::{debug, trace};

use super::Injector;
use crate::context::Context;
use crate::descriptor::Recipe;
use crate::destroy::{release, track, untrack};
use crate::error::{CircularReferenceError, GraftError, NotFoundError, ScopeViolationError};
use crate::events::{EventBus, LifecycleEvent};
use crate::factory;
use crate::pipeline::{Next, run_hooks};
use crate::record::{DefinitionRecord, InstanceRecord, InstanceStatus};
use crate::registry::Selection;
use crate::resolution::{Resolution, Value};
use crate::scope::{Scope, ScopeStrategy};
use crate::session::Session;

/// Value handed back by dry runs in place of an instance.
#[derive(Debug)]
struct DryRun;

struct Found {
    injector: Injector,
    selection: Selection,
}

/// Looks the session's token up and resolves what it finds.
pub(super) fn resolve_session(session: Session) -> Resolution<Value> {
    let max_depth = session.injector().settings().max_depth;
    if session.depth() > max_depth {
        return Resolution::err(GraftError::CircularReference(CircularReferenceError {
            chain: session.path(),
        }));
    }

    let Some(found) = lookup(&session) else {
        return Resolution::err(not_found(&session));
    };
    session.set_resolved(found.injector.clone(), found.selection.primary());

    if session.is_dry_run() {
        return Resolution::ok(Arc::new(DryRun) as Value);
    }

    match found.selection {
        Selection::Single(definition) => resolve_definition(session, definition),
        Selection::Multi(definitions) => {
            let each = definitions
                .into_iter()
                .map(|definition| {
                    let branch = session.branch();
                    branch.set_definition(definition.clone());
                    resolve_definition(branch, definition)
                })
                .collect();
            Resolution::join_all(each).map(|values| Arc::new(values) as Value)
        }
    }
}

/// Walks the hierarchy from the session's injector.
fn lookup(session: &Session) -> Option<Found> {
    let token = session.token();
    let start = session.injector();
    let mut skip_local = session.skips_local();
    let mut current = Some(start.clone());

    while let Some(injector) = current {
        if !skip_local {
            if let Some(selection) = injector.registry().select(token, session) {
                return Some(Found { injector, selection });
            }
            if injector.auto_register(token, injector.id() == start.id()) {
                if let Some(selection) = injector.registry().select(token, session) {
                    return Some(Found { injector, selection });
                }
            }
        }
        skip_local = false;

        for exporter in injector.imports() {
            if exporter.is_destroyed() || !exporter.exports(token) {
                continue;
            }
            if let Some(selection) = exporter.registry().select(token, session) {
                trace!(token = %token, exporter = %exporter.name(), "Resolved through import");
                return Some(Found {
                    injector: exporter,
                    selection,
                });
            }
        }

        current = injector.parent();
    }
    None
}

fn not_found(session: &Session) -> GraftError {
    let mut known = Vec::new();
    let mut current = Some(session.injector());
    while let Some(injector) = current {
        known.extend(injector.registry().tokens().iter().map(|t| t.name().to_string()));
        current = injector.parent();
    }
    let candidates: Vec<&str> = known.iter().map(String::as_str).collect();

    GraftError::NotFound(NotFoundError {
        token: session.token().clone(),
        chain: session.path(),
        suggestions: suggest_similar(session.token().name(), &candidates, 3),
    })
}

/// Runs the definition's hooks around instantiation; unscoped aliases
/// forward to their target instead.
fn resolve_definition(session: Session, definition: Arc<DefinitionRecord>) -> Resolution<Value> {
    if definition.annotations().component {
        if let Some(consumer) = session.parent() {
            return Resolution::err(GraftError::ComponentMisuse {
                token: session.token().clone(),
                consumer: consumer.token().clone(),
            });
        }
    }

    if let Recipe::Existing(target) = definition.recipe() {
        if definition.is_unscoped() {
            return forward(session, &definition, target);
        }
    }

    let hooks = definition.hooks().to_vec();
    run_hooks(
        &hooks,
        session,
        Next::new(move |session| instantiate(session, definition.clone())),
    )
}

/// Resolves an alias as its target, sharing the target's cached identity.
fn forward(session: Session, definition: &DefinitionRecord, target: &crate::token::Token) -> Resolution<Value> {
    let Some(owner) = session.resolved_in() else {
        return Resolution::err(session.not_found());
    };
    trace!(alias = %session.token(), target = %target, "Forwarding alias");

    let forwarded = session.forwarded(target.clone(), owner.clone(), definition.hooks().to_vec());
    let observed = forwarded.clone();
    owner.run_session(forwarded).map(move |value| {
        if let Some(instance) = observed.instance() {
            session.set_instance(instance);
        }
        if observed.flags().side_effects {
            session.mark_side_effects();
        }
        value
    })
}

/// Picks the context through the scope strategy.
fn instantiate(session: Session, definition: Arc<DefinitionRecord>) -> Resolution<Value> {
    let strategy = if session.is_fresh() {
        Scope::Transient.strategy()
    } else {
        match definition.strategy() {
            Ok(strategy) => strategy,
            Err(error) => return Resolution::err(error),
        }
    };

    if let Some(explicit) = session.explicit_context() {
        if !explicit.is_static() && !strategy.can_be_overridden(&session) {
            return Resolution::err(GraftError::ScopeViolation(ScopeViolationError {
                token: session.token().clone(),
                scope: strategy.name().to_string(),
                reason: "a custom context cannot override this scope".to_string(),
            }));
        }
    }

    let context = strategy.context(&session);
    context.and_then(move |context| create_instance(session, definition, strategy, context))
}

/// Returns the cached instance for `context`, or builds one.
///
/// A record another thread is still building synchronously is waited for.
/// Top-level instances in contexts no later request can reach are handed
/// to the caller and not cached.
fn create_instance(
    session: Session,
    definition: Arc<DefinitionRecord>,
    strategy: Arc<dyn ScopeStrategy>,
    context: Context,
) -> Resolution<Value> {
    session.set_context(context);

    for ancestor in session.ancestors() {
        let same = ancestor.context() == Some(context)
            && ancestor
                .definition()
                .is_some_and(|d| d.id() == definition.id());
        if !same {
            continue;
        }
        return match ancestor.instance().and_then(|record| record.value()) {
            Some(value) => {
                trace!(token = %session.token(), "Cycle resolved to the allocated instance");
                Resolution::ok(value)
            }
            None => Resolution::err(circular(&session, ancestor)),
        };
    }

    let reusable = strategy.is_reusable(context, &session);
    let parent = session.parent().and_then(Session::instance);

    let record = loop {
        let (record, created) = definition.instance_for(context, reusable);
        if created {
            break record;
        }
        if !record.wait_for_builder() {
            return Resolution::err(GraftError::CircularReference(CircularReferenceError {
                chain: session.path(),
            }));
        }
        match (record.status(), record.value(), record.pending()) {
            (InstanceStatus::Resolved, Some(value), _) => {
                session.set_instance(record.clone());
                track(&record, parent.as_ref());
                return Resolution::ok(value);
            }
            (InstanceStatus::Pending, _, Some(pending)) => {
                session.set_instance(record.clone());
                track(&record, parent.as_ref());
                session.mark_async();
                return Resolution::pending(pending);
            }
            // Destroyed, or the other thread's construction failed.
            _ => {
                trace!(token = %session.token(), context = %context, "Retrying a settled instance");
                definition.forget(&record);
            }
        }
    };

    strategy.on_instance(&record);
    session.set_instance(record.clone());
    track(&record, parent.as_ref());
    let events = session.injector().events().clone();
    let hand_over = session.parent().is_none() && !reusable && !session.flags().retain;

    match factory::construct(&session, &definition, &record) {
        Resolution::Ready(Ok(value)) => {
            finish(&record, &value, &events);
            if hand_over {
                release(&record);
            }
            Resolution::ok(value)
        }
        Resolution::Ready(Err(error)) => {
            abandon(&record, parent.as_ref());
            Resolution::err(error)
        }
        Resolution::Pending(future) => {
            session.mark_async();
            let pending_record = record.clone();
            let shared = async move {
                match future.await {
                    Ok(value) => {
                        finish(&pending_record, &value, &events);
                        if hand_over {
                            release(&pending_record);
                        }
                        Ok(value)
                    }
                    Err(error) => {
                        abandon(&pending_record, parent.as_ref());
                        Err(error)
                    }
                }
            }
            .boxed()
            .shared();
            record.set_pending(shared.clone());
            Resolution::pending(shared)
        }
    }
}

fn finish(record: &InstanceRecord, value: &Value, events: &EventBus) {
    record.resolve(value.clone());
    debug!(token = %record.token(), context = %record.context(), "Instance created");
    events.emit(&LifecycleEvent::InstanceCreated {
        token: record.token().clone(),
        context: record.context(),
    });
}

/// Drops a failed construction so the next request starts over, and wakes
/// threads waiting for it.
fn abandon(record: &Arc<InstanceRecord>, parent: Option<&Arc<InstanceRecord>>) {
    untrack(record, parent);
    release(record);
    record.abandon();
}

/// The cycle from `ancestor` down to `session`.
fn circular(session: &Session, ancestor: &Session) -> GraftError {
    let mut chain = vec![session.token().clone()];
    for step in session.ancestors() {
        chain.push(step.token().clone());
        if step.id() == ancestor.id() {
            break;
        }
    }
    chain.reverse();
    GraftError::CircularReference(CircularReferenceError { chain })
}
