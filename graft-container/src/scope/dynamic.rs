use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::context::Context;
use crate::destroy::{DestroyEvent, expire};
use crate::record::InstanceRecord;
use crate::resolution::Resolution;
use crate::scope::ScopeStrategy;
use crate::session::Session;

type Object = Arc<dyn Any + Send + Sync>;

struct Entry {
    object: Weak<dyn Any + Send + Sync>,
    context: Context,
    instances: Vec<Weak<InstanceRecord>>,
}

/// One instance per runtime object supplied with the request.
///
/// Objects are held weakly. Once an object is dropped its entry disappears
/// and the instances built for it are torn down, the next time the scope is
/// consulted. Requests without an object share the static context.
#[derive(Default)]
pub struct DynamicScope {
    entries: Mutex<Vec<Entry>>,
}

impl DynamicScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context assigned to `object`, minted on first sight.
    pub fn context_for(&self, object: &Object) -> Context {
        let (context, expired) = {
            let mut entries = self.entries.lock();
            let expired = prune(&mut entries);

            let key = Arc::as_ptr(object);
            let known = entries
                .iter()
                .find(|entry| std::ptr::addr_eq(entry.object.as_ptr(), key))
                .map(|entry| entry.context);
            let context = known.unwrap_or_else(|| {
                let context = Context::fresh();
                entries.push(Entry {
                    object: Arc::downgrade(object),
                    context,
                    instances: Vec::new(),
                });
                context
            });
            (context, expired)
        };
        expire_all(expired);
        context
    }

    /// Number of live objects tracked.
    pub fn len(&self) -> usize {
        let (len, expired) = {
            let mut entries = self.entries.lock();
            let expired = prune(&mut entries);
            (entries.len(), expired)
        };
        expire_all(expired);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes entries whose object is gone and returns their instances.
fn prune(entries: &mut Vec<Entry>) -> Vec<Arc<InstanceRecord>> {
    let mut expired = Vec::new();
    entries.retain_mut(|entry| {
        if entry.object.strong_count() > 0 {
            entry.instances.retain(|instance| instance.strong_count() > 0);
            return true;
        }
        expired.extend(entry.instances.drain(..).filter_map(|instance| instance.upgrade()));
        false
    });
    expired
}

fn expire_all(expired: Vec<Arc<InstanceRecord>>) {
    for record in expired {
        trace!(token = %record.token(), context = %record.context(), "Object dropped, expiring instance");
        expire(record);
    }
}

impl std::fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicScope")
            .field("objects", &self.entries.lock().len())
            .finish()
    }
}

impl ScopeStrategy for DynamicScope {
    fn name(&self) -> &str {
        "Dynamic"
    }

    fn context(&self, session: &Session) -> Resolution<Context> {
        let context = match session.object() {
            Some(object) => self.context_for(&object),
            None => Context::STATIC,
        };
        Resolution::ok(context)
    }

    fn should_destroy(&self, _instance: &InstanceRecord, _event: DestroyEvent) -> bool {
        true
    }

    fn can_be_overridden(&self, _session: &Session) -> bool {
        false
    }

    fn on_instance(&self, instance: &Arc<InstanceRecord>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.context == instance.context()) {
            entry.instances.push(Arc::downgrade(instance));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_object_same_context() {
        let scope = DynamicScope::new();
        let request: Object = Arc::new("request-1");
        let other: Object = Arc::new("request-2");

        assert_eq!(scope.context_for(&request), scope.context_for(&request));
        assert_ne!(scope.context_for(&request), scope.context_for(&other));
    }

    #[test]
    fn dropped_objects_are_forgotten() {
        let scope = DynamicScope::new();
        let request: Object = Arc::new(1u32);
        scope.context_for(&request);
        assert_eq!(scope.len(), 1);
        drop(request);
        assert!(scope.is_empty());
    }
}
