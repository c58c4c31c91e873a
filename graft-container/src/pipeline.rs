//! The hook pipeline.
//!
//! A [`Hook`] wraps one step of a resolution. It receives the [`Session`] and
//! a [`Next`] continuation, and may adjust the session, short-circuit, or
//! post-process what `next` returns. Because results are [`Resolution`]s, a
//! hook written with the combinators works unchanged over sync and async
//! graphs.
//!
//! Hooks run in two places:
//! - call-site hooks (passed to `get`, or declared on an injection argument)
//!   wrap the lookup of the token;
//! - definition hooks (declared on the provider) wrap instantiation of the
//!   selected definition.
//!
//! ```
//! use std::sync::Arc;
//! use graft_container::prelude::*;
//!
//! let injector = Injector::new();
//! injector.provide(ProviderDescriptor::value("greeting", "hello".to_string())).unwrap();
//!
//! let shout: Arc<dyn Hook> = Arc::new(|session: Session, next: Next| {
//!     next.run(session).map(|value| {
//!         let text = value.downcast_ref::<String>().cloned().unwrap_or_default();
//!         Arc::new(text.to_uppercase()) as Value
//!     })
//! });
//!
//! let value = injector.get_sync("greeting", vec![shout]).unwrap();
//! assert_eq!(value.downcast_ref::<String>().unwrap(), "HELLO");
//! ```

use std::sync::Arc;

use crate::resolution::{Resolution, Value};
use crate::session::Session;

/// An interceptor around a resolution step.
pub trait Hook: Send + Sync + 'static {
    fn handle(&self, session: Session, next: Next) -> Resolution<Value>;
}

impl<F> Hook for F
where
    F: Fn(Session, Next) -> Resolution<Value> + Send + Sync + 'static,
{
    fn handle(&self, session: Session, next: Next) -> Resolution<Value> {
        self(session, next)
    }
}

/// The rest of the chain. Cloneable and callable more than once, which dry
/// runs rely on.
#[derive(Clone)]
pub struct Next(Arc<dyn Fn(Session) -> Resolution<Value> + Send + Sync>);

impl Next {
    pub fn new(step: impl Fn(Session) -> Resolution<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(step))
    }

    #[inline]
    pub fn run(&self, session: Session) -> Resolution<Value> {
        (self.0)(session)
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next(..)")
    }
}

/// Composes `hooks` around `terminal`; `hooks[0]` is outermost.
pub(crate) fn compose(hooks: &[Arc<dyn Hook>], terminal: Next) -> Next {
    hooks.iter().rev().fold(terminal, |next, hook| {
        let hook = hook.clone();
        Next::new(move |session| hook.handle(session, next.clone()))
    })
}

/// Runs `session` through `hooks` and then `terminal`.
pub(crate) fn run_hooks(hooks: &[Arc<dyn Hook>], session: Session, terminal: Next) -> Resolution<Value> {
    if hooks.is_empty() {
        return terminal.run(session);
    }
    compose(hooks, terminal).run(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::Injector;
    use crate::token::Token;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn Hook> {
        let log = log.clone();
        Arc::new(move |session: Session, next: Next| {
            log.lock().push(format!("enter {label}"));
            let log = log.clone();
            next.run(session).map(move |value| {
                log.lock().push(format!("leave {label}"));
                value
            })
        })
    }

    #[test]
    fn first_hook_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = vec![recording(&log, "outer"), recording(&log, "inner")];
        let terminal = {
            let log = log.clone();
            Next::new(move |_| {
                log.lock().push("terminal".into());
                Resolution::ok(Arc::new(()) as Value)
            })
        };

        let session = Session::new(Token::named("t"), Injector::new(), Vec::new(), None, None);
        run_hooks(&hooks, session, terminal).into_ready().unwrap().unwrap();

        assert_eq!(
            *log.lock(),
            vec!["enter outer", "enter inner", "terminal", "leave inner", "leave outer"]
        );
    }

    #[test]
    fn next_can_run_twice() {
        let calls = Arc::new(Mutex::new(0));
        let terminal = {
            let calls = calls.clone();
            Next::new(move |_| {
                *calls.lock() += 1;
                Resolution::ok(Arc::new(()) as Value)
            })
        };
        let twice: Arc<dyn Hook> = Arc::new(|session: Session, next: Next| {
            let _ = next.run(session.dry_run());
            next.run(session)
        });

        let session = Session::new(Token::named("t"), Injector::new(), Vec::new(), None, None);
        assert!(run_hooks(&[twice], session, terminal).into_ready().is_some());
        assert_eq!(*calls.lock(), 2);
    }
}
