//! Provider, definition and instance records.
//!
//! ```text
//! Registry ──token──> ProviderRecord ──> [DefinitionRecord] ──context──> InstanceRecord
//! ```
//!
//! A [`ProviderRecord`] groups every definition registered for one token in
//! one injector. A [`DefinitionRecord`] is one recipe plus its instance
//! cache, keyed by [`Context`]. An [`InstanceRecord`] is one realized value
//! with its status and its edges in the retain graph.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use futures::future::{BoxFuture, Shared};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::annotations::{Annotations, Visibility};
use crate::context::Context;
use crate::descriptor::{OnDestroy, ProviderDescriptor, Recipe};
use crate::error::{GraftError, Result};
use crate::pipeline::Hook;
use crate::injector::{Injector, WeakInjector};
use crate::resolution::{Value, downcast};
use crate::scope::{ScopeRef, ScopeStrategy};
use crate::session::Session;
use crate::token::Token;

static NEXT_RECORD: AtomicU64 = AtomicU64::new(1);

pub(crate) type PendingValue = Shared<BoxFuture<'static, Result<Value>>>;

// ═══════════════════════════════════════════
// ProviderRecord
// ═══════════════════════════════════════════

/// Every definition of one token in one injector.
pub struct ProviderRecord {
    token: Token,
    definitions: RwLock<Vec<Arc<DefinitionRecord>>>,
}

impl ProviderRecord {
    pub(crate) fn new(token: Token) -> Self {
        Self {
            token,
            definitions: RwLock::new(Vec::new()),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<Arc<DefinitionRecord>> {
        self.definitions.read().clone()
    }

    /// `true` once a multi definition was registered.
    pub fn is_multi(&self) -> bool {
        self.definitions.read().first().is_some_and(|d| d.is_multi())
    }

    pub(crate) fn definitions_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Vec<Arc<DefinitionRecord>>> {
        self.definitions.write()
    }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("token", &self.token)
            .field("definitions", &self.definitions.read().len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// DefinitionRecord
// ═══════════════════════════════════════════

/// One registered recipe and its instance cache.
pub struct DefinitionRecord {
    id: u64,
    sequence: u64,
    descriptor: ProviderDescriptor,
    owner: WeakInjector,
    strategy: OnceCell<Arc<dyn ScopeStrategy>>,
    instances: Mutex<HashMap<Context, Arc<InstanceRecord>>>,
    this: Weak<DefinitionRecord>,
}

impl DefinitionRecord {
    pub(crate) fn new(descriptor: ProviderDescriptor, owner: &Injector, sequence: u64) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: NEXT_RECORD.fetch_add(1, Ordering::Relaxed),
            sequence,
            descriptor,
            owner: owner.downgrade(),
            strategy: OnceCell::new(),
            instances: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Registration sequence number; later registrations compare greater.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn token(&self) -> &Token {
        &self.descriptor.token
    }

    pub fn recipe(&self) -> &Recipe {
        &self.descriptor.recipe
    }

    pub fn annotations(&self) -> &Annotations {
        &self.descriptor.annotations
    }

    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.descriptor.hooks
    }

    pub fn on_destroy(&self) -> Option<&OnDestroy> {
        self.descriptor.on_destroy.as_ref()
    }

    pub fn is_multi(&self) -> bool {
        self.descriptor.annotations.multi
    }

    pub fn is_constrained(&self) -> bool {
        self.descriptor.constraint.is_some()
    }

    /// `true` when no scope was declared.
    pub fn is_unscoped(&self) -> bool {
        self.descriptor.scope.is_none()
    }

    /// The injector this definition was registered in.
    pub fn injector(&self) -> Option<Injector> {
        self.owner.upgrade()
    }

    /// Display name of the scope, once resolved.
    pub fn scope_name(&self) -> Option<String> {
        self.strategy.get().map(|s| s.name().to_string())
    }

    /// Visibility for a request starting in `session.origin()`.
    pub(crate) fn is_visible_to(&self, session: &Session) -> bool {
        match self.descriptor.annotations.visibility {
            Visibility::Public => true,
            Visibility::Private => self.owner.is(&session.origin()),
        }
    }

    /// Name, tags and constraint all accept the session.
    pub(crate) fn accepts(&self, session: &Session) -> bool {
        let name = session.name();
        self.descriptor
            .annotations
            .matches_request(name.as_deref(), &session.tags())
            && self
                .descriptor
                .constraint
                .as_ref()
                .is_none_or(|constraint| constraint.matches(session))
    }

    /// Same slot for replacement: unconstrained, single, equal name and order.
    pub(crate) fn occupies_same_slot(&self, descriptor: &ProviderDescriptor) -> bool {
        !self.is_constrained()
            && !self.is_multi()
            && self.descriptor.annotations.name == descriptor.annotations.name
            && self.descriptor.annotations.order == descriptor.annotations.order
    }

    /// The scope strategy, resolved once from the owning injector.
    pub(crate) fn strategy(&self) -> Result<Arc<dyn ScopeStrategy>> {
        self.strategy
            .get_or_try_init(|| {
                let owner = self.owner.upgrade().ok_or_else(|| GraftError::InjectorDestroyed {
                    injector: self.owner.name().to_string(),
                })?;
                match &self.descriptor.scope {
                    Some(ScopeRef::Strategy(strategy)) => Ok(strategy.clone()),
                    Some(ScopeRef::Provider(token)) => {
                        let value = owner.get_sync(token.clone(), Vec::new())?;
                        downcast::<Arc<dyn ScopeStrategy>>(token, value).map(|s| (*s).clone())
                    }
                    None => Ok(owner.settings().default_scope.strategy()),
                }
            })
            .cloned()
    }

    /// Cached strategy without resolving it.
    pub(crate) fn cached_strategy(&self) -> Option<Arc<dyn ScopeStrategy>> {
        self.strategy.get().cloned()
    }

    /// The instance for `context`, created as pending when absent. A created
    /// record is marked as being built by the current thread.
    ///
    /// `reusable` is false when no later request can select `context` again.
    pub(crate) fn instance_for(&self, context: Context, reusable: bool) -> (Arc<InstanceRecord>, bool) {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(&context) {
            return (existing.clone(), false);
        }
        let record = Arc::new(InstanceRecord::new(
            self.descriptor.token.clone(),
            context,
            reusable,
            self.this.clone(),
        ));
        instances.insert(context, record.clone());
        (record, true)
    }

    /// Removes `record` from the cache if it is still the cached one.
    pub(crate) fn forget(&self, record: &InstanceRecord) {
        let mut instances = self.instances.lock();
        if instances
            .get(&record.context)
            .is_some_and(|cached| cached.id == record.id)
        {
            instances.remove(&record.context);
        }
    }

    /// Live instances.
    pub fn instances(&self) -> Vec<Arc<InstanceRecord>> {
        self.instances.lock().values().cloned().collect()
    }
}

impl fmt::Debug for DefinitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionRecord")
            .field("id", &self.id)
            .field("token", &self.descriptor.token)
            .field("recipe", &self.descriptor.recipe.kind())
            .field("scope", &self.scope_name())
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// InstanceRecord
// ═══════════════════════════════════════════

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Construction started; the value may already be allocated.
    Pending,
    Resolved,
    Destroyed,
}

struct InstanceState {
    status: InstanceStatus,
    value: Option<Value>,
    pending: Option<PendingValue>,
    /// Thread running a synchronous construction.
    builder: Option<ThreadId>,
    /// Parent instance id to reference count.
    parents: HashMap<u64, usize>,
    children: HashMap<u64, Arc<InstanceRecord>>,
}

/// One realized value keyed by (definition, context).
pub struct InstanceRecord {
    id: u64,
    token: Token,
    context: Context,
    boundary: Context,
    reusable: bool,
    definition: Weak<DefinitionRecord>,
    state: Mutex<InstanceState>,
    settled: Condvar,
}

impl InstanceRecord {
    fn new(token: Token, context: Context, reusable: bool, definition: Weak<DefinitionRecord>) -> Self {
        Self {
            id: NEXT_RECORD.fetch_add(1, Ordering::Relaxed),
            token,
            context,
            boundary: Context::fresh(),
            reusable,
            definition,
            state: Mutex::new(InstanceState {
                status: InstanceStatus::Pending,
                value: None,
                pending: None,
                builder: Some(thread::current().id()),
                parents: HashMap::new(),
                children: HashMap::new(),
            }),
            settled: Condvar::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    #[inline]
    pub fn context(&self) -> Context {
        self.context
    }

    /// Context shared by local-scoped instances built beneath this one.
    #[inline]
    pub fn boundary(&self) -> Context {
        self.boundary
    }

    /// `false` when no later request can select this record's context.
    #[inline]
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    pub fn definition(&self) -> Option<Arc<DefinitionRecord>> {
        self.definition.upgrade()
    }

    pub fn status(&self) -> InstanceStatus {
        self.state.lock().status
    }

    /// The value, once allocated.
    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    /// Number of distinct parent instances. Repeated references from the
    /// same parent count once.
    pub fn parent_count(&self) -> usize {
        self.state.lock().parents.len()
    }

    pub fn children(&self) -> Vec<Arc<InstanceRecord>> {
        self.state.lock().children.values().cloned().collect()
    }

    pub(crate) fn pending(&self) -> Option<PendingValue> {
        self.state.lock().pending.clone()
    }

    /// Publishes the identity before dependencies are filled in.
    pub(crate) fn allocate(&self, value: Value) {
        let mut state = self.state.lock();
        if state.status == InstanceStatus::Pending {
            state.value = Some(value);
        }
    }

    pub(crate) fn resolve(&self, value: Value) {
        let mut state = self.state.lock();
        if state.status == InstanceStatus::Pending {
            state.value = Some(value);
            state.status = InstanceStatus::Resolved;
            state.pending = None;
        }
        self.settle(&mut state);
    }

    pub(crate) fn set_pending(&self, pending: PendingValue) {
        let mut state = self.state.lock();
        state.pending = Some(pending);
        self.settle(&mut state);
    }

    /// Ends a synchronous construction that failed.
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock();
        self.settle(&mut state);
    }

    fn settle(&self, state: &mut InstanceState) {
        if state.builder.take().is_some() {
            self.settled.notify_all();
        }
    }

    /// Blocks while another thread is building this record synchronously.
    ///
    /// Returns `false` without waiting when the current thread is the
    /// builder, which means the construction re-entered itself.
    pub(crate) fn wait_for_builder(&self) -> bool {
        let current = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.builder {
                Some(builder) if builder == current => return false,
                Some(_) => self.settled.wait(&mut state),
                None => return true,
            }
        }
    }

    // ── Retain graph ──

    pub(crate) fn add_parent(&self, parent: u64) {
        *self.state.lock().parents.entry(parent).or_insert(0) += 1;
    }

    /// Drops one reference from `parent`; `true` when none remain from it.
    pub(crate) fn remove_parent(&self, parent: u64) -> bool {
        let mut state = self.state.lock();
        match state.parents.get_mut(&parent) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                state.parents.remove(&parent);
                true
            }
            None => true,
        }
    }

    /// Drops every reference from `parent`.
    pub(crate) fn clear_parent(&self, parent: u64) {
        self.state.lock().parents.remove(&parent);
    }

    pub(crate) fn add_child(&self, child: Arc<InstanceRecord>) {
        self.state.lock().children.insert(child.id, child);
    }

    pub(crate) fn remove_child(&self, child: u64) {
        self.state.lock().children.remove(&child);
    }

    pub(crate) fn take_children(&self) -> Vec<Arc<InstanceRecord>> {
        self.state.lock().children.drain().map(|(_, child)| child).collect()
    }

    /// Marks destroyed; returns the value and the children to release, or
    /// `None` when this record may not be destroyed now.
    pub(crate) fn begin_destroy(&self) -> Option<(Option<Value>, Vec<Arc<InstanceRecord>>)> {
        let mut state = self.state.lock();
        if state.status == InstanceStatus::Destroyed || !state.parents.is_empty() {
            return None;
        }
        state.status = InstanceStatus::Destroyed;
        state.pending = None;
        self.settle(&mut state);
        let children = state.children.drain().map(|(_, child)| child).collect();
        Some((state.value.take(), children))
    }
}

impl fmt::Debug for InstanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InstanceRecord")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("context", &self.context)
            .field("status", &state.status)
            .field("parents", &state.parents.len())
            .field("children", &state.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(injector: &Injector) -> Arc<DefinitionRecord> {
        DefinitionRecord::new(ProviderDescriptor::value("answer", 42u32), injector, 0)
    }

    #[test]
    fn one_instance_per_context() {
        let injector = Injector::new();
        let def = definition(&injector);

        let (a, created_a) = def.instance_for(Context::STATIC, true);
        let (b, created_b) = def.instance_for(Context::STATIC, true);
        let (c, _) = def.instance_for(Context::fresh(), false);

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(def.instances().len(), 2);
    }

    #[test]
    fn parent_references_are_counted() {
        let injector = Injector::new();
        let def = definition(&injector);
        let (child, _) = def.instance_for(Context::STATIC, true);

        child.add_parent(7);
        child.add_parent(7);
        assert!(!child.remove_parent(7));
        assert_eq!(child.parent_count(), 1);
        assert!(child.begin_destroy().is_none());
        assert!(child.remove_parent(7));
        assert!(child.begin_destroy().is_some());
        assert_eq!(child.status(), InstanceStatus::Destroyed);
        assert!(child.begin_destroy().is_none());
    }

    #[test]
    fn parent_count_ignores_repeated_references() {
        let injector = Injector::new();
        let def = definition(&injector);
        let (child, _) = def.instance_for(Context::STATIC, true);

        child.add_parent(7);
        child.add_parent(7);
        child.add_parent(8);
        assert_eq!(child.parent_count(), 2);
    }

    #[test]
    fn builder_thread_does_not_wait_on_itself() {
        let injector = Injector::new();
        let def = definition(&injector);
        let (record, _) = def.instance_for(Context::STATIC, true);

        assert!(!record.wait_for_builder());
        record.resolve(Arc::new(1u8));
        assert!(record.wait_for_builder());
    }

    #[test]
    fn other_threads_wait_until_the_record_settles() {
        let injector = Injector::new();
        let def = definition(&injector);
        let (record, _) = def.instance_for(Context::STATIC, true);

        let waiting = record.clone();
        let waiter = std::thread::spawn(move || {
            let waited = waiting.wait_for_builder();
            (waited, waiting.status())
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        record.abandon();

        assert_eq!(waiter.join().unwrap(), (true, InstanceStatus::Pending));
    }

    #[test]
    fn resolve_clears_pending() {
        let injector = Injector::new();
        let def = definition(&injector);
        let (record, _) = def.instance_for(Context::STATIC, true);

        record.allocate(Arc::new(1u8));
        assert_eq!(record.status(), InstanceStatus::Pending);
        assert!(record.value().is_some());

        record.resolve(Arc::new(2u8));
        assert_eq!(record.status(), InstanceStatus::Resolved);
        assert_eq!(record.value().unwrap().downcast_ref::<u8>(), Some(&2));

        def.forget(&record);
        assert!(def.instances().is_empty());
    }
}
