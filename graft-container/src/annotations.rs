//! Provider annotations and selection constraints.
//!
//! Annotations describe *which* definition a request should land on when a
//! token has several: a name, tags, visibility, an explicit order, and whether
//! the token accumulates (`multi`). Constraints are arbitrary predicates over
//! the requesting [`Session`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::session::Session;
use crate::token::Token;

/// Whether a definition is visible outside the injector that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    /// Visible only to requests that start in the declaring injector.
    Private,
}

/// Label marking a definition as a boundary for [`LocalScope`](crate::scope::LocalScope).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeBoundary(pub Arc<str>);

impl ScopeBoundary {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }
}

type Extensions = anymap2::Map<dyn anymap2::any::CloneAnySendSync + Send + Sync>;

/// Metadata attached to a provider definition.
#[derive(Clone, Default)]
pub struct Annotations {
    pub name: Option<Arc<str>>,
    pub tags: Vec<Arc<str>>,
    pub visibility: Visibility,
    /// Higher order wins for single providers; multi providers sort ascending.
    pub order: i32,
    pub multi: bool,
    /// Resolvable at the top level only, never as a dependency.
    pub component: bool,
    extra: Extensions,
}

impl Annotations {
    /// Attaches a typed extension value, replacing any previous one of the
    /// same type.
    pub fn insert<T: Any + Clone + Send + Sync>(&mut self, value: T) {
        self.extra.insert(value);
    }

    pub fn get<T: Any + Clone + Send + Sync>(&self) -> Option<&T> {
        self.extra.get::<T>()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| &**t == tag)
    }

    /// `true` when the request's name and tags select this definition.
    pub(crate) fn matches_request(&self, name: Option<&str>, tags: &[Arc<str>]) -> bool {
        self.name.as_deref() == name && tags.iter().all(|tag| self.has_tag(tag))
    }
}

impl fmt::Debug for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotations")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("visibility", &self.visibility)
            .field("order", &self.order)
            .field("multi", &self.multi)
            .field("component", &self.component)
            .field("extensions", &self.extra.len())
            .finish()
    }
}

/// A predicate deciding whether a definition may serve a request.
///
/// # Examples
/// ```
/// use graft_container::annotations::Constraint;
/// use graft_container::token::Token;
///
/// struct Reports;
///
/// // Only serve requests named "audit" that come from Reports.
/// let constraint = Constraint::named("audit").and(Constraint::injected_into(Token::of::<Reports>()));
/// # let _ = constraint;
/// ```
#[derive(Clone)]
pub struct Constraint(Arc<dyn Fn(&Session) -> bool + Send + Sync>);

impl Constraint {
    pub fn custom(predicate: impl Fn(&Session) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Matches requests carrying this name.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self::custom(move |session| session.name().as_deref() == Some(&*name))
    }

    /// Matches requests carrying this tag.
    pub fn tagged(tag: impl Into<Arc<str>>) -> Self {
        let tag = tag.into();
        Self::custom(move |session| session.tags().contains(&tag))
    }

    /// Matches requests made on behalf of `consumer`.
    pub fn injected_into(consumer: impl Into<Token>) -> Self {
        let consumer = consumer.into();
        Self::custom(move |session| {
            session
                .parent()
                .is_some_and(|parent| parent.token() == &consumer)
        })
    }

    pub fn and(self, other: Constraint) -> Self {
        Self::custom(move |session| self.matches(session) && other.matches(session))
    }

    pub fn or(self, other: Constraint) -> Self {
        Self::custom(move |session| self.matches(session) || other.matches(session))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::custom(move |session| !self.matches(session))
    }

    #[inline]
    pub fn matches(&self, session: &Session) -> bool {
        (self.0)(session)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Constraint(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_matching_is_strict_on_name() {
        let mut annotations = Annotations::default();
        assert!(annotations.matches_request(None, &[]));
        assert!(!annotations.matches_request(Some("primary"), &[]));

        annotations.name = Some("primary".into());
        assert!(annotations.matches_request(Some("primary"), &[]));
        assert!(!annotations.matches_request(None, &[]));
    }

    #[test]
    fn requested_tags_must_all_be_present() {
        let annotations = Annotations {
            tags: vec!["fast".into(), "local".into()],
            ..Default::default()
        };
        assert!(annotations.matches_request(None, &["fast".into()]));
        assert!(!annotations.matches_request(None, &["fast".into(), "remote".into()]));
    }

    #[test]
    fn extensions_are_typed() {
        let mut annotations = Annotations::default();
        annotations.insert(ScopeBoundary::new("request"));
        assert_eq!(
            annotations.get::<ScopeBoundary>(),
            Some(&ScopeBoundary::new("request"))
        );
        assert!(annotations.get::<u32>().is_none());

        let copy = annotations.clone();
        assert!(copy.get::<ScopeBoundary>().is_some());
    }

    #[test]
    fn extensions_cross_threads() {
        let mut annotations = Annotations::default();
        annotations.insert(ScopeBoundary::new("worker"));
        let shared = Arc::new(annotations);

        let remote = shared.clone();
        let label = std::thread::spawn(move || remote.get::<ScopeBoundary>().map(|b| b.0.clone()))
            .join()
            .unwrap();
        assert_eq!(label.as_deref(), Some("worker"));
    }
}
