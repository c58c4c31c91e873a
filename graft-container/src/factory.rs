//! Factory resolvers: turn a recipe into a value.
//!
//! Arguments resolve through the same pipeline as top-level requests, with
//! the current session as their parent. Sibling arguments are started
//! together; the construction goes asynchronous only if one of them does.
//!
//! Class and factory recipes publish the new value on the instance record
//! before properties and methods are injected, so a dependency cycle through
//! a property sees the same identity instead of recursing.

use std::sync::Arc;

use tracing::trace;

use crate::descriptor::{Args, InjectionArgument, InjectionPlan, Recipe};
use crate::error::GraftError;
use crate::injector::Injector;
use crate::record::{DefinitionRecord, InstanceRecord};
use crate::resolution::{Resolution, Value};
use crate::session::{InjectionSite, Session};

/// Produces the value for `definition` within `session`.
pub(crate) fn construct(
    session: &Session,
    definition: &Arc<DefinitionRecord>,
    record: &Arc<InstanceRecord>,
) -> Resolution<Value> {
    let Some(injector) = session.resolved_in() else {
        return Resolution::err(session.not_found());
    };
    trace!(token = %definition.token(), recipe = definition.recipe().kind(), "Constructing");

    match definition.recipe() {
        Recipe::Value(value) => Resolution::ok(value.clone()),
        Recipe::Existing(target) => injector.inject(target.clone(), Vec::new(), Some(session.clone()), None),
        Recipe::Class { constructor, plan } => {
            let constructor = constructor.clone();
            let token = definition.token().clone();
            let build = move |args: Args| {
                Resolution::Ready(constructor(&args).map_err(|error| wrap(&token, error)))
            };
            assemble(session, &injector, plan, record, build)
        }
        Recipe::Factory { factory, plan } => {
            let factory = factory.clone();
            let token = definition.token().clone();
            let build = move |args: Args| {
                let token = token.clone();
                factory(args).then(move |result| Resolution::from(result.map_err(|error| wrap(&token, error))))
            };
            assemble(session, &injector, plan, record, build)
        }
    }
}

/// Resolves parameters, builds, allocates, then injects members.
fn assemble(
    session: &Session,
    injector: &Injector,
    plan: &InjectionPlan,
    record: &Arc<InstanceRecord>,
    build: impl FnOnce(Args) -> Resolution<Value> + Send + 'static,
) -> Resolution<Value> {
    let token = session.token().clone();
    let parameters = resolve_all(session, injector, &plan.parameters, InjectionSite::Parameter);
    let members_session = session.clone();
    let members_injector = injector.clone();
    let plan = plan.clone();
    let record = record.clone();

    parameters
        .and_then(move |values| build(Args::new(token, values)))
        .and_then(move |value| {
            record.allocate(value.clone());
            inject_members(&members_session, &members_injector, &plan, value)
        })
}

/// Fills properties, then calls methods, on an allocated value.
fn inject_members(session: &Session, injector: &Injector, plan: &InjectionPlan, value: Value) -> Resolution<Value> {
    if plan.properties.is_empty() && plan.methods.is_empty() {
        return Resolution::ok(value);
    }

    let properties: Vec<_> = plan
        .properties
        .iter()
        .map(|property| {
            let site = InjectionSite::Property(property.name.clone());
            resolve_one(session, injector, &property.argument, site)
        })
        .collect();

    let methods: Vec<_> = plan
        .methods
        .iter()
        .map(|method| {
            let name = method.name.clone();
            resolve_all(session, injector, &method.arguments, move |index| InjectionSite::Method {
                name: name.clone(),
                index,
            })
        })
        .collect();

    let token = session.token().clone();
    let plan = plan.clone();
    Resolution::join_all(properties).and_then(move |property_values| {
        Resolution::join_all(methods).and_then(move |method_values| {
            let applied = plan
                .properties
                .iter()
                .zip(property_values)
                .try_for_each(|(property, dependency)| (property.apply)(&value, dependency))
                .and_then(|()| {
                    plan.methods
                        .iter()
                        .zip(method_values)
                        .try_for_each(|(method, values)| (method.apply)(&value, Args::new(token.clone(), values)))
                });
            Resolution::from(applied.map(|()| value).map_err(|error| wrap(&token, error)))
        })
    })
}

fn resolve_all(
    session: &Session,
    injector: &Injector,
    arguments: &[InjectionArgument],
    site: impl Fn(usize) -> InjectionSite,
) -> Resolution<Vec<Value>> {
    let pending = arguments
        .iter()
        .enumerate()
        .map(|(index, argument)| resolve_one(session, injector, argument, site(index)))
        .collect();
    Resolution::join_all(pending)
}

fn resolve_one(
    session: &Session,
    injector: &Injector,
    argument: &InjectionArgument,
    site: InjectionSite,
) -> Resolution<Value> {
    injector.inject(
        argument.token.clone(),
        argument.hooks.clone(),
        Some(session.clone()),
        Some(site),
    )
}

/// Attaches the construction token to errors that name none.
fn wrap(token: &crate::token::Token, error: GraftError) -> GraftError {
    match error {
        GraftError::ConstructionFailed { .. } => error,
        other if other.token().is_some() => other,
        other => GraftError::construction(token, other.to_string()),
    }
}
