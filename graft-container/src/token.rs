//! Injection tokens.
//!
//! A [`Token`] names something an injector can be asked for. Three flavours
//! exist, mirroring how applications usually identify dependencies:
//!
//! - a Rust type ([`Token::of`]), the common case for services
//! - a string ([`Token::named`] or `From<&str>`), for configuration values
//! - a unique token object ([`Token::unique`]), equal only to its own clones

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use graft_support::rendering::shorten_type_name;

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
enum TokenKind {
    Type(TypeId),
    Name(Arc<str>),
    Unique(u64),
}

/// Identifies a requestable dependency.
///
/// # Examples
/// ```
/// use graft_container::token::Token;
///
/// struct Database;
///
/// let by_type = Token::of::<Database>();
/// assert!(by_type.name().ends_with("Database"));
///
/// let by_name = Token::named("database_url");
/// assert_eq!(by_name, Token::from("database_url"));
///
/// let a = Token::unique("cache");
/// let b = Token::unique("cache");
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// ```
#[derive(Clone)]
pub struct Token {
    kind: TokenKind,
    name: Arc<str>,
}

impl Token {
    /// Token for the Rust type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            kind: TokenKind::Type(TypeId::of::<T>()),
            name: Arc::from(type_name::<T>()),
        }
    }

    /// Token identified by a string. Two string tokens with the same text
    /// are equal.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self {
            kind: TokenKind::Name(name.clone()),
            name,
        }
    }

    /// A fresh token object, equal only to itself and its clones.
    ///
    /// `description` is used for display only.
    pub fn unique(description: impl Into<Arc<str>>) -> Self {
        Self {
            kind: TokenKind::Unique(NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed)),
            name: description.into(),
        }
    }

    /// Full display name: the type path, the string, or the description.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with module paths stripped, used in error messages.
    pub fn short_name(&self) -> String {
        match self.kind {
            TokenKind::Type(_) => shorten_type_name(&self.name),
            TokenKind::Name(_) | TokenKind::Unique(_) => self.name.to_string(),
        }
    }

    /// Returns the [`TypeId`] when this is a type token.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        match self.kind {
            TokenKind::Type(id) => Some(id),
            _ => None,
        }
    }

    /// `true` for tokens created by [`Token::unique`].
    #[inline]
    pub fn is_unique(&self) -> bool {
        matches!(self.kind, TokenKind::Unique(_))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TokenKind::Type(a), TokenKind::Type(b)) => a == b,
            (TokenKind::Name(a), TokenKind::Name(b)) => a == b,
            (TokenKind::Unique(a), TokenKind::Unique(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.kind {
            TokenKind::Type(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            TokenKind::Name(name) => {
                1u8.hash(state);
                name.hash(state);
            }
            TokenKind::Unique(id) => {
                2u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Type(_) => write!(f, "Token({})", self.name),
            TokenKind::Name(_) => write!(f, "Token({:?})", self.name),
            TokenKind::Unique(id) => write!(f, "Token({}#{id})", self.name),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Type(_) => f.write_str(&self.short_name()),
            TokenKind::Name(_) => write!(f, "{:?}", self.name),
            TokenKind::Unique(id) => write!(f, "{}#{id}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MyStruct;

    #[test]
    fn type_token_equality() {
        assert_eq!(Token::of::<String>(), Token::of::<String>());
        assert_ne!(Token::of::<String>(), Token::of::<i32>());
        assert!(Token::of::<MyStruct>().name().contains("MyStruct"));
    }

    #[test]
    fn string_token_is_not_a_type_token() {
        let by_name = Token::named(type_name::<String>());
        assert_ne!(by_name, Token::of::<String>());
    }

    #[test]
    fn unique_tokens_differ_even_with_same_description() {
        let a = Token::unique("db");
        let b = Token::unique("db");
        assert_ne!(a, b);
        assert!(a.is_unique());
    }

    #[test]
    fn tokens_as_map_keys() {
        let mut map = HashMap::new();
        map.insert(Token::of::<String>(), "string");
        map.insert(Token::from("url"), "url");
        assert_eq!(map.get(&Token::of::<String>()), Some(&"string"));
        assert_eq!(map.get(&Token::named("url")), Some(&"url"));
        assert_eq!(map.get(&Token::of::<bool>()), None);
    }

    #[test]
    fn display_uses_short_names() {
        assert_eq!(Token::of::<MyStruct>().to_string(), "MyStruct");
        assert_eq!(Token::named("url").to_string(), "\"url\"");
    }

    #[test]
    fn unsized_type_token() {
        trait MyTrait {}
        let token = Token::of::<dyn MyTrait>();
        assert!(token.type_id().is_some());
    }
}
