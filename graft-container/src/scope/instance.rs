use crate::context::Context;
use crate::destroy::DestroyEvent;
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::scope::ScopeStrategy;
use crate::session::Session;

/// One instance per top-level resolution graph.
///
/// Every request made while resolving the same outermost `get` shares the
/// instance; the next top-level `get` builds a new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceScope;

impl ScopeStrategy for InstanceScope {
    fn name(&self) -> &str {
        "Instance"
    }

    fn context(&self, session: &Session) -> Resolution<Context> {
        Resolution::ok(session.graph_context())
    }

    fn should_destroy(&self, _instance: &InstanceRecord, _event: DestroyEvent) -> bool {
        true
    }

    fn can_be_overridden(&self, _session: &Session) -> bool {
        false
    }

    fn is_reusable(&self, _context: Context, _session: &Session) -> bool {
        false
    }
}
