//! Tree-shakable providers registered on first use.
//!
//! Providers declared with [`auto_provide!`](crate::auto_provide) are
//! collected at link time with `inventory`. They are not registered
//! anywhere until a lookup misses their token in an injector they target.
//!
//! ```
//! use graft_container::auto::ProvidedIn;
//! use graft_container::prelude::*;
//!
//! struct Clock;
//!
//! fn clock() -> ProviderDescriptor {
//!     ProviderDescriptor::value(Token::of::<Clock>(), Clock)
//! }
//!
//! graft_container::auto_provide!(ProvidedIn::Root, clock);
//!
//! let injector = Injector::new();
//! assert!(injector.resolve::<Clock>().is_ok());
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::descriptor::ProviderDescriptor;
use crate::token::Token;

/// Which injectors an auto provider registers itself in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvidedIn {
    /// Only injectors without a parent.
    Root,
    /// The injector the missing lookup started in.
    Any,
}

/// A provider submitted through [`auto_provide!`](crate::auto_provide).
#[derive(Debug)]
pub struct AutoProvider {
    pub provided_in: ProvidedIn,
    pub descriptor: fn() -> ProviderDescriptor,
}

impl AutoProvider {
    pub const fn new(provided_in: ProvidedIn, descriptor: fn() -> ProviderDescriptor) -> Self {
        Self {
            provided_in,
            descriptor,
        }
    }
}

inventory::collect!(AutoProvider);

/// Declares a provider registered lazily on first lookup.
///
/// `$descriptor` is a `fn() -> ProviderDescriptor`.
#[macro_export]
macro_rules! auto_provide {
    ($provided_in:expr, $descriptor:path) => {
        $crate::inventory::submit! {
            $crate::auto::AutoProvider::new($provided_in, $descriptor)
        }
    };
}

static INDEX: Lazy<HashMap<Token, Vec<&'static AutoProvider>>> = Lazy::new(|| {
    let mut index: HashMap<Token, Vec<&'static AutoProvider>> = HashMap::new();
    for provider in inventory::iter::<AutoProvider> {
        index
            .entry((provider.descriptor)().token)
            .or_default()
            .push(provider);
    }
    index
});

/// Auto providers for `token`, in submission order.
pub(crate) fn candidates(token: &Token) -> &'static [&'static AutoProvider] {
    INDEX.get(token).map_or(&[], Vec::as_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Indexed;

    fn indexed() -> ProviderDescriptor {
        ProviderDescriptor::value(Token::of::<Indexed>(), Indexed)
    }

    crate::auto_provide!(ProvidedIn::Any, indexed);

    #[test]
    fn submitted_providers_are_indexed_by_token() {
        let found = candidates(&Token::of::<Indexed>());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provided_in, ProvidedIn::Any);
        assert!(candidates(&Token::named("nothing")).is_empty());
    }
}
