use crate::context::Context;
use crate::destroy::DestroyEvent;
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::scope::ScopeStrategy;
use crate::session::Session;

/// The caller's context when one was supplied, otherwise static.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScope;

impl ScopeStrategy for DefaultScope {
    fn name(&self) -> &str {
        "Default"
    }

    fn context(&self, session: &Session) -> Resolution<Context> {
        Resolution::ok(session.explicit_context().unwrap_or(Context::STATIC))
    }

    fn should_destroy(&self, _instance: &InstanceRecord, event: DestroyEvent) -> bool {
        matches!(event, DestroyEvent::Injector | DestroyEvent::Replaced)
    }
}
