//! Error types for Graft injection.
//!
//! Every failure names the token that was requested and, where it matters,
//! the chain of sessions that led there. Errors are `Clone` so that a
//! construction shared by several waiters can fail for all of them alike.

use std::fmt;
use std::sync::Arc;

use graft_support::rendering::render_chain;

use crate::token::Token;

/// Main error type for all Graft operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraftError {
    /// No visible provider for the token anywhere in the injector chain.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// A dependency cycle with no allocated identity to hand back.
    #[error("{}", .0)]
    CircularReference(CircularReferenceError),

    /// A scope rejected the context it was asked to work with.
    #[error("{}", .0)]
    ScopeViolation(ScopeViolationError),

    /// A component-only provider was requested as a dependency.
    #[error(
        "{token} is registered as a component and cannot be injected into {consumer}\n  \
         Hint: resolve components at the top level only"
    )]
    ComponentMisuse { token: Token, consumer: Token },

    /// Multi and single registrations were mixed for one token.
    #[error(
        "Cannot mix multi and single providers for {token}\n  \
         Hint: mark every registration of this token as multi, or none of them"
    )]
    MultiProviderConflict { token: Token },

    /// The slot was already taken and overriding is disabled.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// A factory or constructor failed.
    #[error("Failed to construct {token}: {source}")]
    ConstructionFailed {
        token: Token,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The resolved value is not of the requested Rust type.
    #[error("Type mismatch for {token}: expected {expected}")]
    TypeMismatch { token: Token, expected: &'static str },

    /// A synchronous read hit a graph that went asynchronous.
    #[error("{token} resolves asynchronously\n  Hint: use get_async() or .await the resolution")]
    AsyncResolution { token: Token },

    /// A synchronous hierarchy build met a lazily loaded module.
    #[error("Module {module} imports a lazily loaded module\n  Hint: use Injector::from_module_async()")]
    AsyncModule { module: String },

    /// A forward import was never pointed at a live module.
    #[error("Module {module} imports a forward reference that is not set")]
    UnsetForwardImport { module: String },

    /// The injector was already torn down.
    #[error("Injector {injector} has been destroyed")]
    InjectorDestroyed { injector: String },
}

impl GraftError {
    /// Wraps a factory's own error.
    pub fn construction(
        token: &Token,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConstructionFailed {
            token: token.clone(),
            source: Arc::from(source.into()),
        }
    }

    /// `true` for lookup failures that Optional/Fallback hooks may absorb.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The token the failing request asked for, when the error names one.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::NotFound(e) => Some(&e.token),
            Self::CircularReference(e) => e.chain.last(),
            Self::ScopeViolation(e) => Some(&e.token),
            Self::ComponentMisuse { token, .. }
            | Self::MultiProviderConflict { token }
            | Self::ConstructionFailed { token, .. }
            | Self::TypeMismatch { token, .. }
            | Self::AsyncResolution { token } => Some(token),
            Self::AlreadyRegistered(e) => Some(&e.token),
            Self::AsyncModule { .. } | Self::UnsetForwardImport { .. } | Self::InjectorDestroyed { .. } => None,
        }
    }
}

/// No provider was visible for a token.
#[derive(Debug, Clone)]
pub struct NotFoundError {
    /// The token that was requested.
    pub token: Token,
    /// Tokens of the sessions that led here, outermost first.
    pub chain: Vec<Token>,
    /// Registered names that look like the requested one.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No provider for {}", self.token)?;

        if self.chain.len() > 1 {
            let names: Vec<String> = self.chain.iter().map(Token::to_string).collect();
            write!(f, "\n  Resolution path: {}", render_chain(&names))?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: provide {} in this injector, a parent, or an imported module that exports it",
            self.token
        )
    }
}

/// A cycle reached a session whose instance has no identity yet.
#[derive(Debug, Clone)]
pub struct CircularReferenceError {
    /// The cycle, starting and ending with the same token.
    pub chain: Vec<Token>,
}

impl fmt::Display for CircularReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chain.iter().map(Token::to_string).collect();
        write!(f, "Circular reference detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: break the cycle through a property or method injection so an identity exists first"
        )
    }
}

/// A scope refused a context.
#[derive(Debug, Clone)]
pub struct ScopeViolationError {
    pub token: Token,
    pub scope: String,
    pub reason: String,
}

impl fmt::Display for ScopeViolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scope violation for {} ({}): {}",
            self.token, self.scope, self.reason
        )
    }
}

/// Re-registration of an occupied slot while overriding is disabled.
#[derive(Debug, Clone)]
pub struct AlreadyRegisteredError {
    pub token: Token,
    pub injector: String,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Provider already registered for {} in injector {}",
            self.token, self.injector
        )?;
        write!(
            f,
            "\n  Hint: annotate the new provider with a name or order, or enable allow_override in settings"
        )
    }
}

/// Convenient Result type for Graft operations.
pub type Result<T> = std::result::Result<T, GraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;
    struct UserService;

    #[test]
    fn not_found_display() {
        let err = GraftError::NotFound(NotFoundError {
            token: Token::of::<Database>(),
            chain: vec![Token::of::<UserService>(), Token::of::<Database>()],
            suggestions: vec!["app::Databse".into()],
        });

        let msg = err.to_string();
        assert!(msg.contains("No provider for Database"));
        assert!(msg.contains("UserService → Database"));
        assert!(msg.contains("Did you mean"));
        assert!(err.is_not_found());
    }

    #[test]
    fn circular_reference_display() {
        let err = GraftError::CircularReference(CircularReferenceError {
            chain: vec![
                Token::of::<Database>(),
                Token::of::<UserService>(),
                Token::of::<Database>(),
            ],
        });

        let msg = err.to_string();
        assert!(msg.contains("Circular"));
        assert!(msg.contains("→"));
        assert_eq!(err.token(), Some(&Token::of::<Database>()));
    }

    #[test]
    fn scope_violation_display() {
        let err = GraftError::ScopeViolation(ScopeViolationError {
            token: Token::of::<Database>(),
            scope: "Singleton".into(),
            reason: "custom contexts are not accepted".into(),
        });

        let msg = err.to_string();
        assert!(msg.contains("Scope violation"));
        assert!(msg.contains("Singleton"));
    }

    #[test]
    fn construction_failure_keeps_source() {
        let err = GraftError::construction(&Token::named("db"), "connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());

        let cloned = err.clone();
        assert_eq!(cloned.token(), Some(&Token::named("db")));
    }
}
