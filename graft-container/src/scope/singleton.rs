use crate::context::Context;
use crate::destroy::DestroyEvent;
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::scope::ScopeStrategy;
use crate::session::Session;

/// One instance per definition, for the life of the injector.
///
/// Refuses explicitly supplied contexts and is torn down only with its
/// injector or when its definition is replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingletonScope;

impl ScopeStrategy for SingletonScope {
    fn name(&self) -> &str {
        "Singleton"
    }

    fn context(&self, _session: &Session) -> Resolution<Context> {
        Resolution::ok(Context::STATIC)
    }

    fn should_destroy(&self, _instance: &InstanceRecord, event: DestroyEvent) -> bool {
        matches!(event, DestroyEvent::Injector | DestroyEvent::Replaced)
    }

    fn can_be_overridden(&self, _session: &Session) -> bool {
        false
    }
}
