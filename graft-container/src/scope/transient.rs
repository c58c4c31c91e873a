use crate::context::Context;
use crate::destroy::DestroyEvent;
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::scope::ScopeStrategy;
use crate::session::Session;

/// A new instance per request.
///
/// With [`reusing(true)`](TransientScope::reusing) an explicitly supplied
/// context is honoured, so callers can share one transient instance between
/// several requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientScope {
    reuse: bool,
}

impl TransientScope {
    pub const fn new() -> Self {
        Self { reuse: false }
    }

    pub const fn reusing(reuse: bool) -> Self {
        Self { reuse }
    }
}

impl ScopeStrategy for TransientScope {
    fn name(&self) -> &str {
        "Transient"
    }

    fn context(&self, session: &Session) -> Resolution<Context> {
        match session.explicit_context() {
            Some(context) if self.reuse => Resolution::ok(context),
            _ => Resolution::ok(Context::fresh()),
        }
    }

    fn should_destroy(&self, _instance: &InstanceRecord, _event: DestroyEvent) -> bool {
        true
    }

    fn can_be_overridden(&self, _session: &Session) -> bool {
        self.reuse
    }

    fn is_reusable(&self, context: Context, session: &Session) -> bool {
        self.reuse && session.explicit_context() == Some(context)
    }
}
