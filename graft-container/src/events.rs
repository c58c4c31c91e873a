//! Lifecycle events and plugins.
//!
//! The core announces what happens to providers, instances, modules and
//! injectors on an [`EventBus`]. It never depends on who listens; plugins
//! subscribe through [`Plugin::install`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::context::Context;
use crate::token::Token;

/// Something that happened inside an injector hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    ProviderAdded { injector: String, token: Token },
    InstanceCreated { token: Token, context: Context },
    InstanceDestroyed { token: Token, context: Context },
    ModuleAdded { module: String, injector: String },
    InjectorCreated { injector: String },
    InjectorDestroyed { injector: String },
}

impl LifecycleEvent {
    /// Event name such as `provider:add`.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::ProviderAdded { .. } => "provider:add",
            LifecycleEvent::InstanceCreated { .. } => "instance:create",
            LifecycleEvent::InstanceDestroyed { .. } => "instance:destroy",
            LifecycleEvent::ModuleAdded { .. } => "module:add",
            LifecycleEvent::InjectorCreated { .. } => "injector:create",
            LifecycleEvent::InjectorDestroyed { .. } => "injector:destroy",
        }
    }
}

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Synchronous fan-out of [`LifecycleEvent`]s.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use graft_container::events::{EventBus, LifecycleEvent};
///
/// let bus = EventBus::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let subscription = bus.subscribe(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// bus.emit(&LifecycleEvent::InjectorCreated { injector: "root".into() });
/// assert!(bus.unsubscribe(subscription));
/// bus.emit(&LifecycleEvent::InjectorCreated { injector: "root".into() });
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(Subscription, Listener)>>,
    next: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static) -> Subscription {
        let subscription = Subscription(self.next.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((subscription, Arc::new(listener)));
        subscription
    }

    /// `false` when the subscription was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription);
        listeners.len() != before
    }

    /// Delivers `event` to every listener, in subscription order.
    pub fn emit(&self, event: &LifecycleEvent) {
        let listeners: Vec<Listener> = self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

/// An extension that hooks into the event bus of an injector hierarchy.
pub trait Plugin: Send + Sync {
    fn install(&self, bus: &EventBus);

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl Plugin for Recorder {
        fn install(&self, bus: &EventBus) {
            let seen = self.0.clone();
            bus.subscribe(move |event| seen.lock().push(event.kind()));
        }
    }

    #[test]
    fn plugin_sees_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        Recorder(seen.clone()).install(&bus);

        bus.emit(&LifecycleEvent::ProviderAdded {
            injector: "root".into(),
            token: Token::named("a"),
        });
        bus.emit(&LifecycleEvent::InstanceCreated {
            token: Token::named("a"),
            context: Context::STATIC,
        });

        assert_eq!(*seen.lock(), vec!["provider:add", "instance:create"]);
        assert!(Recorder(seen).name().contains("Recorder"));
    }

    #[test]
    fn listener_may_subscribe_while_emitting() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        bus.emit(&LifecycleEvent::InjectorCreated {
            injector: "root".into(),
        });
        assert_eq!(bus.len(), 2);
    }
}
