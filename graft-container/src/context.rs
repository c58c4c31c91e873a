//! Instance identity keys.
//!
//! A [`Context`] is the cache key that, together with a definition, picks one
//! instance. [`Context::STATIC`] is the default long-lived identity; every
//! other context is minted with [`Context::fresh`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Opaque instance cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context {
    id: u64,
}

impl Context {
    /// The process-wide static context.
    pub const STATIC: Context = Context { id: 0 };

    /// Mints a context distinct from every other one.
    pub fn fresh() -> Self {
        Self {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.id == 0
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static() {
            f.write_str("Context(static)")
        } else {
            write!(f, "Context(#{})", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_contexts_are_distinct() {
        let a = Context::fresh();
        let b = Context::fresh();
        assert_ne!(a, b);
        assert!(!a.is_static());
        assert!(Context::STATIC.is_static());
    }

    #[test]
    fn display() {
        assert_eq!(Context::STATIC.to_string(), "Context(static)");
        assert!(Context::fresh().to_string().starts_with("Context(#"));
    }
}
