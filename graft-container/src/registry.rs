//! Provider registry: the token → definitions store of one injector.
//!
//! Registration follows three rules:
//! - a token is either multi or single; mixing the two fails with
//!   [`GraftError::MultiProviderConflict`];
//! - a single, unconstrained registration replaces the unconstrained
//!   definition in the same slot (same name and order), unless overriding
//!   is disabled;
//! - everything else coexists and is told apart at lookup time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::descriptor::ProviderDescriptor;
use crate::error::{AlreadyRegisteredError, GraftError, Result};
use crate::injector::Injector;
use crate::record::{DefinitionRecord, ProviderRecord};
use crate::session::Session;
use crate::token::Token;

/// Result of a lookup in one registry.
#[derive(Debug, Clone)]
pub(crate) enum Selection {
    Single(Arc<DefinitionRecord>),
    /// Every satisfying definition, ascending by (order, registration).
    Multi(Vec<Arc<DefinitionRecord>>),
}

impl Selection {
    /// The definition reported by dry runs: the single one, or the last
    /// of a multi selection.
    pub(crate) fn primary(&self) -> Option<Arc<DefinitionRecord>> {
        match self {
            Selection::Single(definition) => Some(definition.clone()),
            Selection::Multi(definitions) => definitions.last().cloned(),
        }
    }
}

/// Outcome of [`Registry::register`].
pub(crate) struct Registered {
    pub definition: Arc<DefinitionRecord>,
    pub replaced: Option<Arc<DefinitionRecord>>,
}

/// Stores every provider of one injector.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    providers: DashMap<Token, Arc<ProviderRecord>>,
    sequence: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition for `descriptor.token`, owned by `owner`.
    ///
    /// # Errors
    /// - [`GraftError::MultiProviderConflict`] when multi and single
    ///   registrations are mixed
    /// - [`GraftError::AlreadyRegistered`] when the slot is taken and
    ///   `allow_override` is false
    pub fn register(
        &self,
        owner: &Injector,
        descriptor: ProviderDescriptor,
        allow_override: bool,
    ) -> Result<Registered> {
        let token = descriptor.token.clone();
        let record = self
            .providers
            .entry(token.clone())
            .or_insert_with(|| Arc::new(ProviderRecord::new(token.clone())))
            .clone();

        let mut definitions = record.definitions_mut();

        if definitions
            .first()
            .is_some_and(|first| first.is_multi() != descriptor.annotations.multi)
        {
            return Err(GraftError::MultiProviderConflict { token });
        }

        let mut replaced = None;
        if !descriptor.annotations.multi && descriptor.constraint.is_none() {
            if let Some(position) = definitions
                .iter()
                .position(|existing| existing.occupies_same_slot(&descriptor))
            {
                if !allow_override {
                    return Err(GraftError::AlreadyRegistered(AlreadyRegisteredError {
                        token,
                        injector: owner.name().to_string(),
                    }));
                }
                replaced = Some(definitions.remove(position));
            }
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let definition = DefinitionRecord::new(descriptor, owner, sequence);
        definitions.push(definition.clone());

        debug!(
            token = %token,
            injector = %owner.name(),
            recipe = definition.recipe().kind(),
            replaced = replaced.is_some(),
            "Registered provider"
        );

        Ok(Registered {
            definition,
            replaced,
        })
    }

    pub fn get(&self, token: &Token) -> Option<Arc<ProviderRecord>> {
        self.providers.get(token).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
    }

    /// Picks what `session` should resolve to among this registry's
    /// definitions for `token`.
    ///
    /// Candidates must be visible to the session's origin and accept its
    /// name, tags and constraint. For single tokens a constrained candidate
    /// beats an unconstrained one, then the higher order wins, then the
    /// later registration.
    pub fn select(&self, token: &Token, session: &Session) -> Option<Selection> {
        let record = self.get(token)?;
        let mut candidates: Vec<Arc<DefinitionRecord>> = record
            .definitions()
            .into_iter()
            .filter(|d| d.is_visible_to(session) && d.accepts(session))
            .collect();

        if candidates.is_empty() {
            trace!(token = %token, "No definition accepts the request");
            return None;
        }

        if record.is_multi() {
            candidates.sort_by_key(|d| (d.annotations().order, d.sequence()));
            return Some(Selection::Multi(candidates));
        }

        candidates
            .into_iter()
            .max_by_key(|d| (d.is_constrained(), d.annotations().order, d.sequence()))
            .map(Selection::Single)
    }

    /// Every definition, for teardown and inspection.
    pub fn definitions(&self) -> Vec<Arc<DefinitionRecord>> {
        self.providers
            .iter()
            .flat_map(|entry| entry.value().definitions())
            .collect()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.providers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn providers(&self) -> Vec<Arc<ProviderRecord>> {
        self.providers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Constraint;

    struct Database;

    fn session(injector: &Injector, token: &Token) -> Session {
        Session::new(token.clone(), injector.clone(), Vec::new(), None, None)
    }

    fn selected_value(registry: &Registry, injector: &Injector, token: &Token) -> u32 {
        let Some(Selection::Single(definition)) = registry.select(token, &session(injector, token)) else {
            panic!("single selection expected");
        };
        let crate::descriptor::Recipe::Value(value) = definition.recipe() else {
            panic!("value recipe expected");
        };
        *value.downcast_ref::<u32>().unwrap()
    }

    #[test]
    fn register_and_select() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::of::<Database>();
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 1u32), true)
            .unwrap();
        assert!(registry.contains(&token));
        assert_eq!(selected_value(&registry, &injector, &token), 1);
    }

    #[test]
    fn same_slot_is_replaced() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::named("db");
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 1u32), true)
            .unwrap();
        let second = registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 2u32), true)
            .unwrap();

        assert!(second.replaced.is_some());
        assert_eq!(registry.get(&token).unwrap().definitions().len(), 1);
        assert_eq!(selected_value(&registry, &injector, &token), 2);
    }

    #[test]
    fn duplicate_fails_without_override() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::named("db");
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 1u32), false)
            .unwrap();
        let err = registry
            .register(&injector, ProviderDescriptor::value(token, 2u32), false)
            .err()
            .unwrap();
        assert!(matches!(err, GraftError::AlreadyRegistered(_)));
    }

    #[test]
    fn higher_order_wins_over_later_registration() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::named("db");
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 1u32).order(5), true)
            .unwrap();
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 2u32), true)
            .unwrap();
        assert_eq!(selected_value(&registry, &injector, &token), 1);
    }

    #[test]
    fn constrained_definition_wins_when_it_matches() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::named("db");
        registry
            .register(
                &injector,
                ProviderDescriptor::value(token.clone(), 1u32)
                    .when(Constraint::custom(|s| s.depth() == 0)),
                true,
            )
            .unwrap();
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 2u32).order(9), true)
            .unwrap();
        assert_eq!(selected_value(&registry, &injector, &token), 1);
    }

    #[test]
    fn mixing_multi_and_single_fails() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::named("plugins");
        registry
            .register(&injector, ProviderDescriptor::value(token.clone(), 1u32).multi(), true)
            .unwrap();
        let err = registry
            .register(&injector, ProviderDescriptor::value(token, 2u32), true)
            .err()
            .unwrap();
        assert!(matches!(err, GraftError::MultiProviderConflict { .. }));
    }

    #[test]
    fn multi_accumulates_in_order() {
        let injector = Injector::new();
        let registry = Registry::new();
        let token = Token::named("plugins");
        for (value, order) in [(1u32, 2), (2, 0), (3, 2)] {
            registry
                .register(
                    &injector,
                    ProviderDescriptor::value(token.clone(), value).order(order).multi(),
                    true,
                )
                .unwrap();
        }
        let Some(Selection::Multi(all)) = registry.select(&token, &session(&injector, &token)) else {
            panic!("multi selection expected");
        };
        let orders: Vec<(i32, u64)> = all.iter().map(|d| (d.annotations().order, d.sequence())).collect();
        assert_eq!(orders, vec![(0, 1), (2, 0), (2, 2)]);
    }
}
