use std::sync::Arc;

use crate::annotations::ScopeBoundary;
use crate::context::Context;
use crate::destroy::DestroyEvent;
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::scope::ScopeStrategy;
use crate::session::Session;
use crate::token::Token;

/// What marks an ancestor as a scope boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// The ancestor resolved this token.
    Token(Token),
    /// The ancestor's definition carries this [`ScopeBoundary`] label.
    Label(Arc<str>),
}

/// Which matching ancestor wins when several do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthPolicy {
    #[default]
    Nearest,
    Farthest,
    /// The n-th match counting from the nearest, zero-based.
    Fixed(usize),
}

/// One instance per enclosing boundary instance.
///
/// Walks the live ancestor chain for sessions whose definition matches the
/// boundary and shares the instance among everything built underneath that
/// boundary instance. Without a matching ancestor each request gets a fresh
/// context.
///
/// ```
/// use graft_container::scope::{Boundary, DepthPolicy, LocalScope};
///
/// let per_request = LocalScope::labelled("request").depth(DepthPolicy::Farthest);
/// assert_eq!(per_request.boundary(), &Boundary::Label("request".into()));
/// ```
#[derive(Debug, Clone)]
pub struct LocalScope {
    boundary: Boundary,
    depth: DepthPolicy,
}

impl LocalScope {
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            depth: DepthPolicy::default(),
        }
    }

    pub fn token(token: impl Into<Token>) -> Self {
        Self::new(Boundary::Token(token.into()))
    }

    pub fn labelled(label: impl Into<Arc<str>>) -> Self {
        Self::new(Boundary::Label(label.into()))
    }

    pub fn depth(mut self, depth: DepthPolicy) -> Self {
        self.depth = depth;
        self
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    fn is_boundary(&self, session: &Session) -> bool {
        let Some(definition) = session.definition() else {
            return false;
        };
        match &self.boundary {
            Boundary::Token(token) => definition.token() == token,
            Boundary::Label(label) => definition
                .annotations()
                .get::<ScopeBoundary>()
                .is_some_and(|b| &b.0 == label),
        }
    }

    /// The boundary instance selected by the depth policy.
    fn boundary_of(&self, session: &Session) -> Option<Arc<InstanceRecord>> {
        let mut matches = session
            .ancestors()
            .filter(|ancestor| self.is_boundary(ancestor))
            .filter_map(Session::instance);

        match self.depth {
            DepthPolicy::Nearest => matches.next(),
            DepthPolicy::Farthest => matches.last(),
            DepthPolicy::Fixed(n) => matches.nth(n),
        }
    }
}

impl ScopeStrategy for LocalScope {
    fn name(&self) -> &str {
        "Local"
    }

    fn context(&self, session: &Session) -> Resolution<Context> {
        let context = self
            .boundary_of(session)
            .map_or_else(Context::fresh, |record| record.boundary());
        Resolution::ok(context)
    }

    fn should_destroy(&self, _instance: &InstanceRecord, _event: DestroyEvent) -> bool {
        true
    }

    fn can_be_overridden(&self, _session: &Session) -> bool {
        false
    }

    fn is_reusable(&self, _context: Context, session: &Session) -> bool {
        self.boundary_of(session).is_some()
    }
}
