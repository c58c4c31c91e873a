//! Values that are either ready now or arrive later.
//!
//! Resolution is synchronous until something in the graph returns a future.
//! [`Resolution`] keeps that distinction in the type: combinators stay on the
//! `Ready` path while every input is ready and switch to async composition
//! only when one of them is `Pending`.
//!
//! ```
//! use graft_container::resolution::Resolution;
//!
//! let sync = Resolution::ok(2).map(|n| n * 21);
//! assert!(!sync.is_pending());
//! assert_eq!(sync.into_ready().unwrap().unwrap(), 42);
//! ```

use std::any::Any;
use std::future::{Future, IntoFuture};
use std::sync::Arc;

use futures::future::{self, BoxFuture};

use crate::error::{GraftError, Result};
use crate::token::Token;

/// A type-erased resolved instance.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Identity comparison of two values (same allocation).
#[inline]
pub fn same_value(a: &Value, b: &Value) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Downcasts a value, reporting `token` on mismatch.
pub fn downcast<T: Any + Send + Sync>(token: &Token, value: Value) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| GraftError::TypeMismatch {
        token: token.clone(),
        expected: std::any::type_name::<T>(),
    })
}

/// The outcome of a resolution step: ready now, or pending.
pub enum Resolution<T> {
    Ready(Result<T>),
    Pending(BoxFuture<'static, Result<T>>),
}

impl<T: Send + 'static> Resolution<T> {
    #[inline]
    pub fn ok(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    #[inline]
    pub fn err(error: GraftError) -> Self {
        Self::Ready(Err(error))
    }

    /// Wraps a future.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::Pending(Box::pin(future))
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The ready result, or `None` when pending.
    pub fn into_ready(self) -> Option<Result<T>> {
        match self {
            Self::Ready(result) => Some(result),
            Self::Pending(_) => None,
        }
    }

    /// The ready result; a pending resolution is rejected with
    /// [`GraftError::AsyncResolution`] naming `token`.
    pub fn into_sync(self, token: &Token) -> Result<T> {
        self.into_ready().unwrap_or_else(|| {
            Err(GraftError::AsyncResolution {
                token: token.clone(),
            })
        })
    }

    pub fn map<U, F>(self, f: F) -> Resolution<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Self::Ready(result) => Resolution::Ready(result.map(f)),
            Self::Pending(fut) => Resolution::pending(async move { fut.await.map(f) }),
        }
    }

    /// Chains a step that may itself be sync or async.
    pub fn and_then<U, F>(self, f: F) -> Resolution<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
    {
        match self {
            Self::Ready(Ok(value)) => f(value),
            Self::Ready(Err(error)) => Resolution::Ready(Err(error)),
            Self::Pending(fut) => Resolution::pending(async move { f(fut.await?).await }),
        }
    }

    /// Chains a step that sees errors as well as values.
    pub fn then<U, F>(self, f: F) -> Resolution<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> Resolution<U> + Send + 'static,
    {
        match self {
            Self::Ready(result) => f(result),
            Self::Pending(fut) => Resolution::pending(async move { f(fut.await).await }),
        }
    }

    /// Joins resolutions, preserving order.
    ///
    /// Stays ready when every input is ready. Otherwise all inputs are
    /// driven concurrently and the first error in declaration order wins,
    /// after every sibling has settled.
    pub fn join_all(items: Vec<Resolution<T>>) -> Resolution<Vec<T>> {
        if items.iter().any(Resolution::is_pending) {
            let futures: Vec<_> = items.into_iter().map(IntoFuture::into_future).collect();
            return Resolution::pending(async move {
                future::join_all(futures).await.into_iter().collect()
            });
        }
        Resolution::Ready(items.into_iter().filter_map(Resolution::into_ready).collect())
    }
}

impl<T: Send + 'static> From<Result<T>> for Resolution<T> {
    fn from(result: Result<T>) -> Self {
        Self::Ready(result)
    }
}

impl<T: Send + 'static> IntoFuture for Resolution<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(result) => Box::pin(future::ready(result)),
            Self::Pending(fut) => fut,
        }
    }
}

impl<T> std::fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(Ok(_)) => f.write_str("Resolution::Ready(Ok(..))"),
            Self::Ready(Err(e)) => write!(f, "Resolution::Ready(Err({e:?}))"),
            Self::Pending(_) => f.write_str("Resolution::Pending(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn later(n: u32) -> Resolution<u32> {
        Resolution::pending(async move { Ok(n) })
    }

    #[test]
    fn sync_chain_stays_sync() {
        let r = Resolution::ok(1u32).and_then(|n| Resolution::ok(n + 1)).map(|n| n * 2);
        assert!(!r.is_pending());
        assert_eq!(r.into_sync(&Token::named("n")).unwrap(), 4);
    }

    #[test]
    fn join_of_ready_values_is_ready() {
        let joined = Resolution::join_all(vec![Resolution::ok(1u32), Resolution::ok(2)]);
        assert_eq!(joined.into_ready().unwrap().unwrap(), vec![1, 2]);
    }

    #[test]
    fn join_reports_first_error_in_order() {
        let joined = Resolution::join_all(vec![
            Resolution::ok(1u32),
            Resolution::err(GraftError::AsyncResolution {
                token: Token::named("a"),
            }),
            Resolution::err(GraftError::AsyncResolution {
                token: Token::named("b"),
            }),
        ]);
        let err = joined.into_ready().unwrap().unwrap_err();
        assert_eq!(err.token(), Some(&Token::named("a")));
    }

    #[test]
    fn pending_is_rejected_by_into_sync() {
        let err = later(1).into_sync(&Token::named("slow")).unwrap_err();
        assert!(matches!(err, GraftError::AsyncResolution { .. }));
    }

    #[tokio::test]
    async fn one_pending_input_makes_the_join_async() {
        let joined = Resolution::join_all(vec![Resolution::ok(1u32), later(2), Resolution::ok(3)]);
        assert!(joined.is_pending());
        assert_eq!(joined.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn then_sees_errors() {
        let recovered = Resolution::<u32>::err(GraftError::AsyncResolution {
            token: Token::named("x"),
        })
        .then(|result| Resolution::ok(result.unwrap_or(7)));
        assert_eq!(recovered.await.unwrap(), 7);
    }

    #[test]
    fn value_identity() {
        let a: Value = Arc::new(5u8);
        let b = a.clone();
        let c: Value = Arc::new(5u8);
        assert!(same_value(&a, &b));
        assert!(!same_value(&a, &c));
    }
}
