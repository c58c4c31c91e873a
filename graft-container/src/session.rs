//! Per-resolution state.
//!
//! Every request for a token opens a [`Session`]. It records what was asked
//! for, where the lookup starts, what was found, and which instance is being
//! built. Sessions form a chain through their parent pointer; walking that
//! chain is how cycles are detected and how ancestor-relative scopes find
//! their boundaries.
//!
//! A session is shared (`Clone` is cheap) and its state is interior-mutable,
//! so hooks can adjust it before passing it on.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use graft_support::rendering::{PathEntry, render_path};
use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{GraftError, NotFoundError};
use crate::pipeline::Hook;
use crate::injector::Injector;
use crate::record::{DefinitionRecord, InstanceRecord};
use crate::token::Token;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Where a dependency is being injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionSite {
    Parameter(usize),
    Property(Arc<str>),
    Method { name: Arc<str>, index: usize },
    /// Argument of a function called through [`Injector::call`].
    Function(usize),
}

/// Mutable flags of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Some step of this resolution returned a future.
    pub is_async: bool,
    /// A hook minted a new identity; results must not be memoized.
    pub side_effects: bool,
    /// Lookup only; the factory is never invoked.
    pub dry_run: bool,
    /// The caller keeps the top-level instance for an explicit teardown.
    pub retain: bool,
}

#[derive(Clone)]
struct SessionState {
    injector: Injector,
    origin: Injector,
    skip_local: bool,
    resolved_in: Option<Injector>,
    definition: Option<Arc<DefinitionRecord>>,
    instance: Option<Arc<InstanceRecord>>,
    context: Option<Context>,
    explicit_context: Option<Context>,
    name: Option<Arc<str>>,
    tags: Vec<Arc<str>>,
    object: Option<Arc<dyn Any + Send + Sync>>,
    graph_context: Option<Context>,
    fresh: bool,
    flags: SessionFlags,
}

struct SessionInner {
    id: u64,
    token: Token,
    site: Option<InjectionSite>,
    parent: Option<Session>,
    hooks: Vec<Arc<dyn Hook>>,
    depth: usize,
    state: Mutex<SessionState>,
}

/// State of one resolution attempt.
#[derive(Clone)]
pub struct Session(Arc<SessionInner>);

impl Session {
    pub(crate) fn new(
        token: Token,
        injector: Injector,
        hooks: Vec<Arc<dyn Hook>>,
        parent: Option<Session>,
        site: Option<InjectionSite>,
    ) -> Self {
        let depth = parent.as_ref().map_or(0, |p| p.depth() + 1);
        Self::open(token, injector, hooks, parent, site, depth)
    }

    fn open(
        token: Token,
        injector: Injector,
        hooks: Vec<Arc<dyn Hook>>,
        parent: Option<Session>,
        site: Option<InjectionSite>,
        depth: usize,
    ) -> Self {
        let state = SessionState {
            origin: injector.clone(),
            injector,
            skip_local: false,
            resolved_in: None,
            definition: None,
            instance: None,
            context: None,
            explicit_context: None,
            name: None,
            tags: Vec::new(),
            object: None,
            graph_context: None,
            fresh: false,
            flags: SessionFlags::default(),
        };
        Self(Arc::new(SessionInner {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            token,
            site,
            parent,
            hooks,
            depth,
            state: Mutex::new(state),
        }))
    }

    /// A copy with the same position in the chain and a snapshot of the
    /// current state.
    pub fn branch(&self) -> Session {
        let state = self.0.state.lock().clone();
        Self(Arc::new(SessionInner {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            token: self.0.token.clone(),
            site: self.0.site.clone(),
            parent: self.0.parent.clone(),
            hooks: self.0.hooks.clone(),
            depth: self.0.depth,
            state: Mutex::new(state),
        }))
    }

    /// A branch flagged as dry run.
    pub fn dry_run(&self) -> Session {
        let dry = self.branch();
        dry.0.state.lock().flags.dry_run = true;
        dry
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn token(&self) -> &Token {
        &self.0.token
    }

    pub fn site(&self) -> Option<&InjectionSite> {
        self.0.site.as_ref()
    }

    pub fn parent(&self) -> Option<&Session> {
        self.0.parent.as_ref()
    }

    /// Call-site hooks this session was opened with.
    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.0.hooks
    }

    /// Number of ancestors.
    #[inline]
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Parent, grandparent, and so on up to the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.0.parent.as_ref(),
        }
    }

    /// The outermost session of this resolution graph.
    pub fn root(&self) -> &Session {
        self.ancestors().last().unwrap_or(self)
    }

    /// Tokens from the root down to this session.
    pub fn path(&self) -> Vec<Token> {
        let mut path: Vec<Token> = self.ancestors().map(|s| s.token().clone()).collect();
        path.reverse();
        path.push(self.0.token.clone());
        path
    }

    /// The path rendered vertically, with the scope and injector of each
    /// step that got that far.
    pub fn describe(&self) -> String {
        let mut steps: Vec<&Session> = self.ancestors().collect();
        steps.reverse();
        steps.push(self);
        let entries: Vec<PathEntry> = steps
            .into_iter()
            .map(|step| {
                let state = step.0.state.lock();
                PathEntry {
                    token: step.0.token.to_string(),
                    scope: state.definition.as_ref().and_then(|d| d.scope_name()),
                    injector: state.resolved_in.as_ref().map(|i| i.name().to_string()),
                }
            })
            .collect();
        render_path(&entries)
    }

    // ── Lookup ──

    /// Injector where lookup starts.
    pub fn injector(&self) -> Injector {
        self.0.state.lock().injector.clone()
    }

    pub fn set_injector(&self, injector: Injector) {
        let mut state = self.0.state.lock();
        state.injector = injector;
        state.skip_local = false;
    }

    /// Injector the request was made in; private definitions are visible
    /// only from their own injector.
    pub fn origin(&self) -> Injector {
        self.0.state.lock().origin.clone()
    }

    /// Skip the starting injector's own registry and search only what it
    /// imports and its parents.
    pub(crate) fn skip_local(&self) {
        self.0.state.lock().skip_local = true;
    }

    pub(crate) fn skips_local(&self) -> bool {
        self.0.state.lock().skip_local
    }

    pub fn resolved_in(&self) -> Option<Injector> {
        self.0.state.lock().resolved_in.clone()
    }

    pub fn definition(&self) -> Option<Arc<DefinitionRecord>> {
        self.0.state.lock().definition.clone()
    }

    pub(crate) fn set_resolved(&self, injector: Injector, definition: Option<Arc<DefinitionRecord>>) {
        let mut state = self.0.state.lock();
        state.resolved_in = Some(injector);
        state.definition = definition;
    }

    pub(crate) fn set_definition(&self, definition: Arc<DefinitionRecord>) {
        self.0.state.lock().definition = Some(definition);
    }

    pub fn instance(&self) -> Option<Arc<InstanceRecord>> {
        self.0.state.lock().instance.clone()
    }

    pub(crate) fn set_instance(&self, instance: Arc<InstanceRecord>) {
        self.0.state.lock().instance = Some(instance);
    }

    /// Context selected by the scope, once instantiation started.
    pub fn context(&self) -> Option<Context> {
        self.0.state.lock().context
    }

    pub(crate) fn set_context(&self, context: Context) {
        self.0.state.lock().context = Some(context);
    }

    // ── Request options set by hooks ──

    pub fn explicit_context(&self) -> Option<Context> {
        self.0.state.lock().explicit_context
    }

    pub fn set_explicit_context(&self, context: Context) {
        self.0.state.lock().explicit_context = Some(context);
    }

    pub fn name(&self) -> Option<Arc<str>> {
        self.0.state.lock().name.clone()
    }

    pub fn set_name(&self, name: impl Into<Arc<str>>) {
        self.0.state.lock().name = Some(name.into());
    }

    pub fn tags(&self) -> Vec<Arc<str>> {
        self.0.state.lock().tags.clone()
    }

    pub fn add_tag(&self, tag: impl Into<Arc<str>>) {
        self.0.state.lock().tags.push(tag.into());
    }

    /// Runtime object for dynamic scopes, inherited from the nearest
    /// ancestor that has one.
    pub fn object(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        if let Some(object) = self.0.state.lock().object.clone() {
            return Some(object);
        }
        self.ancestors()
            .find_map(|ancestor| ancestor.0.state.lock().object.clone())
    }

    pub fn set_object(&self, object: Arc<dyn Any + Send + Sync>) {
        self.0.state.lock().object = Some(object);
    }

    /// Context shared by every session of this graph, minted on first use.
    pub fn graph_context(&self) -> Context {
        let root = self.root();
        let mut state = root.0.state.lock();
        *state.graph_context.get_or_insert_with(Context::fresh)
    }

    /// Requested a fresh identity.
    pub fn is_fresh(&self) -> bool {
        self.0.state.lock().fresh
    }

    pub fn mark_fresh(&self) {
        self.0.state.lock().fresh = true;
    }

    // ── Flags ──

    pub fn flags(&self) -> SessionFlags {
        self.0.state.lock().flags
    }

    #[inline]
    pub fn is_dry_run(&self) -> bool {
        self.flags().dry_run
    }

    /// Marks this session and every ancestor: the graph stays async.
    pub fn mark_async(&self) {
        self.update_chain(|flags| flags.is_async = true);
    }

    /// Marks this session and every ancestor, so memoizing hooks anywhere
    /// up the graph skip the result.
    pub fn mark_side_effects(&self) {
        self.update_chain(|flags| flags.side_effects = true);
    }

    pub(crate) fn retain(&self) {
        self.0.state.lock().flags.retain = true;
    }

    fn update_chain(&self, update: impl Fn(&mut SessionFlags)) {
        update(&mut self.0.state.lock().flags);
        for ancestor in self.ancestors() {
            update(&mut ancestor.0.state.lock().flags);
        }
    }

    /// A session for the target of an alias, started in `injector`.
    ///
    /// It keeps this session's parent and site, so the alias is invisible
    /// to constraints and retain tracking, but counts one level deeper for
    /// the depth guard. Request options carry over.
    pub(crate) fn forwarded(&self, target: Token, injector: Injector, hooks: Vec<Arc<dyn Hook>>) -> Session {
        let forwarded = Self::open(
            target,
            injector,
            hooks,
            self.0.parent.clone(),
            self.0.site.clone(),
            self.0.depth + 1,
        );
        {
            let source = self.0.state.lock().clone();
            let mut state = forwarded.0.state.lock();
            state.explicit_context = source.explicit_context;
            state.object = source.object;
            state.fresh = source.fresh;
            state.flags.side_effects |= source.flags.side_effects;
            state.flags.retain = source.flags.retain;
        }
        forwarded
    }

    /// The error for "nothing visible for this session's token".
    pub fn not_found(&self) -> GraftError {
        GraftError::NotFound(NotFoundError {
            token: self.0.token.clone(),
            chain: self.path(),
            suggestions: Vec::new(),
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock();
        f.debug_struct("Session")
            .field("id", &self.0.id)
            .field("token", &self.0.token)
            .field("depth", &self.0.depth)
            .field("injector", &state.injector.name())
            .field("context", &state.context)
            .field("flags", &state.flags)
            .finish()
    }
}

/// Iterator over a session's ancestors, nearest first.
pub struct Ancestors<'a> {
    next: Option<&'a Session>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Session;

    fn next(&mut self) -> Option<&'a Session> {
        let current = self.next?;
        self.next = current.0.parent.as_ref();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(token: &str, parent: Option<Session>) -> Session {
        Session::new(Token::named(token), Injector::new(), Vec::new(), parent, None)
    }

    #[test]
    fn ancestors_and_path() {
        let root = open("a", None);
        let middle = open("b", Some(root.clone()));
        let leaf = open("c", Some(middle.clone()));

        assert_eq!(leaf.depth(), 2);
        assert_eq!(leaf.ancestors().count(), 2);
        assert_eq!(leaf.root().id(), root.id());
        assert_eq!(
            leaf.path(),
            vec![Token::named("a"), Token::named("b"), Token::named("c")]
        );
    }

    #[test]
    fn graph_context_is_shared_by_the_whole_graph() {
        let root = open("a", None);
        let leaf = open("b", Some(root.clone()));
        assert_eq!(leaf.graph_context(), root.graph_context());

        let other = open("a", None);
        assert_ne!(other.graph_context(), root.graph_context());
    }

    #[test]
    fn dry_run_branch_does_not_touch_the_original() {
        let session = open("a", None);
        session.set_name("primary");
        let lookup = session.dry_run();
        lookup.set_name("other");

        assert!(lookup.is_dry_run());
        assert!(!session.is_dry_run());
        assert_eq!(session.name().as_deref(), Some("primary"));
    }

    #[test]
    fn describe_renders_one_line_per_step() {
        let root = open("a", None);
        let leaf = open("b", Some(root));
        let rendered = leaf.describe();

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[?] \"a\"");
        assert_eq!(lines[2], "[?] \"b\"");
    }

    #[test]
    fn side_effects_reach_every_ancestor() {
        let root = open("a", None);
        let middle = open("b", Some(root.clone()));
        let leaf = open("c", Some(middle.clone()));

        leaf.mark_side_effects();
        assert!(root.flags().side_effects);
        assert!(middle.flags().side_effects);
        assert!(!root.flags().is_async);

        let sibling = open("d", Some(root.clone()));
        assert!(!sibling.flags().side_effects);
    }

    #[test]
    fn object_is_inherited() {
        let root = open("a", None);
        root.set_object(Arc::new(5u8));
        let leaf = open("b", Some(root));
        assert!(leaf.object().is_some());
    }
}
