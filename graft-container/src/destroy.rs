//! Retain graph and ordered teardown.
//!
//! When an instance is built while another one is being constructed, the
//! consumer becomes a *parent* of the dependency. An instance is torn down
//! only when no parent references it and its scope approves the
//! [`DestroyEvent`]. Teardown of a parent releases its children and then
//! tries to tear them down as well, so a dependency always outlives its
//! consumers.
//!
//! ```text
//! destroy(Parent) ──> on_destroy(Parent) ──> release(Child) ──> destroy(Child)
//! destroy(Child) while Parent lives ──> no-op
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::events::{EventBus, LifecycleEvent};
use crate::record::InstanceRecord;
use crate::resolution::{Resolution, Value, downcast};

/// Why a teardown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestroyEvent {
    /// An explicit request for one instance.
    Manual,
    /// The owning injector is being destroyed.
    Injector,
    /// The definition was replaced by a new registration.
    Replaced,
}

impl fmt::Display for DestroyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyEvent::Manual => f.write_str("manual"),
            DestroyEvent::Injector => f.write_str("injector"),
            DestroyEvent::Replaced => f.write_str("replaced"),
        }
    }
}

/// Records that `parent` depends on `child`.
pub(crate) fn track(child: &Arc<InstanceRecord>, parent: Option<&Arc<InstanceRecord>>) {
    let Some(parent) = parent else {
        return;
    };
    if parent.id() == child.id() {
        return;
    }
    child.add_parent(parent.id());
    parent.add_child(child.clone());
}

/// Undoes one [`track`] call, used when a construction is abandoned.
pub(crate) fn untrack(child: &Arc<InstanceRecord>, parent: Option<&Arc<InstanceRecord>>) {
    let Some(parent) = parent else {
        return;
    };
    if child.remove_parent(parent.id()) {
        parent.remove_child(child.id());
    }
}

/// Tears down `record` and then whatever it alone kept alive.
///
/// A record that is already destroyed, still referenced, or whose scope
/// refuses `event` is left alone. The teardown action of an approved record
/// runs exactly once. Children are released after the action and torn down
/// concurrently; the first error is reported after all of them finished.
pub(crate) fn teardown(
    record: Arc<InstanceRecord>,
    event: DestroyEvent,
    events: Arc<EventBus>,
) -> Resolution<()> {
    let definition = record.definition();
    let approved = definition
        .as_ref()
        .and_then(|d| d.cached_strategy())
        .is_none_or(|strategy| strategy.should_destroy(&record, event));
    if !approved {
        trace!(token = %record.token(), %event, "Scope refused teardown");
        return Resolution::ok(());
    }

    let Some((value, children)) = record.begin_destroy() else {
        trace!(token = %record.token(), "Instance retained or already destroyed");
        return Resolution::ok(());
    };

    if let Some(definition) = &definition {
        definition.forget(&record);
    }
    debug!(token = %record.token(), context = %record.context(), %event, "Destroying instance");

    let action = match (definition.as_ref().and_then(|d| d.on_destroy().cloned()), value) {
        (Some(action), Some(value)) => action.run(value),
        _ => Resolution::ok(()),
    };

    action.then(move |outcome| {
        events.emit(&LifecycleEvent::InstanceDestroyed {
            token: record.token().clone(),
            context: record.context(),
        });

        let released: Vec<_> = children
            .into_iter()
            .map(|child| {
                child.clear_parent(record.id());
                let event = cascaded(event, &child);
                teardown(child, event, events.clone())
            })
            .collect();

        Resolution::join_all(released)
            .then(move |children| Resolution::from(outcome.and(children.map(|_| ()))))
    })
}

/// Stops tracking `record` without running its teardown action; the value
/// now belongs to whoever holds it.
///
/// Children lose their edge to `record`. Those left without parents whose
/// context no request can select again are released as well.
pub(crate) fn release(record: &Arc<InstanceRecord>) {
    if let Some(definition) = record.definition() {
        definition.forget(record);
    }
    trace!(token = %record.token(), context = %record.context(), "Released instance");
    for child in record.take_children() {
        child.clear_parent(record.id());
        if !child.is_reusable() && child.parent_count() == 0 {
            release(&child);
        }
    }
}

/// Tears `record` down outside of any request. A teardown that goes async
/// is finished by the owning injector's [`destroy`](crate::injector::Injector::destroy).
pub(crate) fn expire(record: Arc<InstanceRecord>) {
    let Some(injector) = record.definition().and_then(|definition| definition.injector()) else {
        return;
    };
    let events = injector.events().clone();
    injector.defer(teardown(record, DestroyEvent::Manual, events));
}

/// The event a released child is torn down with.
///
/// Only children whose own injector is going away see
/// [`DestroyEvent::Injector`]; everything else is released as a manual
/// teardown, which long-lived scopes refuse.
fn cascaded(event: DestroyEvent, child: &InstanceRecord) -> DestroyEvent {
    let owner_destroyed = child
        .definition()
        .and_then(|definition| definition.injector())
        .is_none_or(|injector| injector.is_destroyed());
    match event {
        DestroyEvent::Injector if owner_destroyed => DestroyEvent::Injector,
        _ => DestroyEvent::Manual,
    }
}

/// A resolved value paired with the means to destroy it.
pub struct Destroyable {
    value: Value,
    instance: Option<Arc<InstanceRecord>>,
    events: Arc<EventBus>,
}

impl Destroyable {
    pub(crate) fn new(value: Value, instance: Option<Arc<InstanceRecord>>, events: Arc<EventBus>) -> Self {
        Self {
            value,
            instance,
            events,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value downcast to `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let token = self
            .instance
            .as_ref()
            .map_or_else(crate::token::Token::of::<T>, |record| record.token().clone());
        downcast::<T>(&token, self.value.clone())
    }

    pub fn instance(&self) -> Option<&Arc<InstanceRecord>> {
        self.instance.as_ref()
    }

    /// Tears the instance down with [`DestroyEvent::Manual`].
    pub fn destroy(self) -> Resolution<()> {
        match self.instance {
            Some(record) => teardown(record, DestroyEvent::Manual, self.events),
            None => Resolution::ok(()),
        }
    }
}

impl fmt::Debug for Destroyable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destroyable")
            .field("instance", &self.instance)
            .finish()
    }
}

/// Destroys a value obtained through
/// [`Injector::get_destroyable`](crate::injector::Injector::get_destroyable).
pub fn destroy(destroyable: Destroyable) -> Resolution<()> {
    destroyable.destroy()
}
