//! End-to-end guarantees of the resolution engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use futures::future::join;
use graft_container::prelude::*;
use graft_container::resolution::same_value;
use parking_lot::Mutex;

struct Service;

#[test]
fn singleton_and_default_return_the_same_reference() {
    let injector = Injector::new();
    injector
        .provide(ProviderDescriptor::class("singleton", |_| Ok(Service)).scope(Scope::Singleton))
        .unwrap();
    injector.provide(ProviderDescriptor::class("default", |_| Ok(Service))).unwrap();

    for token in ["singleton", "default"] {
        let first = injector.get_sync(token, vec![]).unwrap();
        let second = injector.get_sync(token, vec![]).unwrap();
        assert!(same_value(&first, &second), "{token} should be cached");
    }
}

#[test]
fn transient_returns_distinct_references() {
    let injector = Injector::new();
    injector
        .provide(ProviderDescriptor::class("transient", |_| Ok(Service)).scope(Scope::Transient))
        .unwrap();

    let first = injector.get_sync("transient", vec![]).unwrap();
    let second = injector.get_sync("transient", vec![]).unwrap();
    assert!(!same_value(&first, &second));
}

#[tokio::test]
async fn concurrent_async_requests_share_one_construction() {
    let injector = Injector::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    injector
        .provide(
            ProviderDescriptor::factory_async("slow", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::task::yield_now().await;
                    Ok(Service)
                }
            })
            .scope(Scope::Singleton),
        )
        .unwrap();

    let first = injector.get("slow", vec![]);
    let second = injector.get("slow", vec![]);
    assert!(first.is_pending());
    assert!(second.is_pending());

    let (a, b) = join(async { first.await }, async { second.await }).await;
    assert!(same_value(&a.unwrap(), &b.unwrap()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Settled: later requests are synchronous.
    assert!(!injector.get("slow", vec![]).is_pending());
}

#[test]
fn concurrent_threads_share_one_synchronous_construction() {
    let injector = Injector::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    injector
        .provide(
            ProviderDescriptor::class("slow", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                Ok(Service)
            })
            .scope(Scope::Singleton),
        )
        .unwrap();

    let builder = {
        let injector = injector.clone();
        thread::spawn(move || injector.get_sync("slow", vec![]))
    };
    thread::sleep(Duration::from_millis(50));
    let waiter = injector.get_sync("slow", vec![]).unwrap();
    let built = builder.join().unwrap().unwrap();

    assert!(same_value(&built, &waiter));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn waiter_retries_after_a_failed_construction_on_another_thread() {
    let injector = Injector::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    injector
        .provide(
            ProviderDescriptor::class("flaky", move |_| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                if call == 0 {
                    return Err(GraftError::construction(&Token::named("flaky"), "first attempt fails"));
                }
                Ok(Service)
            })
            .scope(Scope::Singleton),
        )
        .unwrap();

    let builder = {
        let injector = injector.clone();
        thread::spawn(move || injector.get_sync("flaky", vec![]))
    };
    thread::sleep(Duration::from_millis(50));
    let waiter = injector.get_sync("flaky", vec![]);

    assert!(builder.join().unwrap().is_err());
    assert!(waiter.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

struct A {
    b: Late<B>,
}

struct B {
    a: Arc<A>,
}

#[test]
fn mutual_singletons_see_one_identity() {
    let injector = Injector::new();
    injector
        .provide(
            ProviderDescriptor::class(Token::of::<A>(), |_| Ok(A { b: Late::new() }))
                .property::<A, B, _>("b", Token::of::<B>(), |a, b| {
                    a.b.set(b);
                })
                .scope(Scope::Singleton),
        )
        .unwrap();
    injector
        .provide(
            ProviderDescriptor::class(Token::of::<B>(), |args| Ok(B { a: args.get::<A>(0)? }))
                .inject(Token::of::<A>())
                .scope(Scope::Singleton),
        )
        .unwrap();

    let a = injector.resolve::<A>().unwrap();
    let b = a.b.get().unwrap();
    assert!(Arc::ptr_eq(&b.a, &a));
    assert!(Arc::ptr_eq(&injector.resolve::<A>().unwrap(), &a));
    assert!(Arc::ptr_eq(&injector.resolve::<B>().unwrap(), b));
}

struct Child;

struct Parent {
    child: Arc<Child>,
}

#[test]
fn parent_is_destroyed_before_its_child() {
    let injector = Injector::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (parent_log, child_log) = (log.clone(), log.clone());

    injector
        .provide(
            ProviderDescriptor::class(Token::of::<Child>(), |_| Ok(Child))
                .scope(Scope::Transient)
                .on_destroy(OnDestroy::sync(move |_| {
                    child_log.lock().push("child");
                    Ok(())
                })),
        )
        .unwrap();
    injector
        .provide(
            ProviderDescriptor::class(Token::of::<Parent>(), |args| {
                Ok(Parent { child: args.get::<Child>(0)? })
            })
            .inject(Token::of::<Child>())
            .scope(Scope::Transient)
            .on_destroy(OnDestroy::sync(move |_| {
                parent_log.lock().push("parent");
                Ok(())
            })),
        )
        .unwrap();

    let parent = injector
        .get_destroyable(Token::of::<Parent>(), vec![])
        .into_ready()
        .unwrap()
        .unwrap();
    let child: Value = parent.get::<Parent>().unwrap().child.clone();

    injector.destroy_instance(&child).into_ready().unwrap().unwrap();
    assert!(log.lock().is_empty(), "child is still referenced");

    destroy(parent).into_ready().unwrap().unwrap();
    assert_eq!(*log.lock(), vec!["parent", "child"]);
}

#[test]
fn private_provider_is_visible_only_from_its_module() {
    let feature = Module::builder("feature")
        .export_provider(ProviderDescriptor::value("secret", "s3cr3t").private())
        .export_provider(ProviderDescriptor::value("public", "hello"))
        .build();
    let app = Module::builder("app").import(&feature).build();

    let root = Injector::from_module(&app).unwrap();
    let child = root.module(&feature).unwrap();

    assert_eq!(*child.get_as::<&str>("secret", vec![]).unwrap(), "s3cr3t");
    assert!(root.get_sync("secret", vec![]).unwrap_err().is_not_found());

    assert_eq!(*child.get_as::<&str>("public", vec![]).unwrap(), "hello");
    assert_eq!(*root.get_as::<&str>("public", vec![]).unwrap(), "hello");
}

#[test]
fn diamond_import_builds_the_shared_module_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let shared = Module::builder("shared")
        .export_provider(
            ProviderDescriptor::class("pool", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)))
                .scope(Scope::Singleton),
        )
        .build();
    let left = Module::builder("left").import(&shared).export_module(&shared).build();
    let right = Module::builder("right").import(&shared).export_module(&shared).build();
    let app = Module::builder("app").import(&left).import(&right).build();

    let root = Injector::from_module(&app).unwrap();
    let left_injector = root.module(&left).unwrap();
    let right_injector = root.module(&right).unwrap();

    let shared_from_left = &left_injector.imports()[0];
    let shared_from_right = &right_injector.imports()[0];
    assert_eq!(shared_from_left.id(), shared_from_right.id());

    let via_left = left_injector.get_sync("pool", vec![]).unwrap();
    let via_right = right_injector.get_sync("pool", vec![]).unwrap();
    let via_root = root.get_sync("pool", vec![]).unwrap();
    assert!(same_value(&via_left, &via_right));
    assert!(same_value(&via_left, &via_root));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

struct NeedsB {
    b_value: Arc<&'static str>,
}

#[test]
fn class_receives_value_dependency() {
    let injector = Injector::new();
    injector.provide(ProviderDescriptor::value("B", "bee")).unwrap();
    injector
        .provide(
            ProviderDescriptor::class("A", |args| Ok(NeedsB { b_value: args.get::<&str>(0)? })).inject("B"),
        )
        .unwrap();

    let a = injector.get_as::<NeedsB>("A", vec![]).unwrap();
    assert_eq!(*a.b_value, "bee");
}

#[tokio::test]
async fn async_factory_result_is_shared_while_pending() {
    let injector = Injector::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    injector
        .provide(ProviderDescriptor::factory_async("C", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok("cee") }
        }))
        .unwrap();

    let first = injector.get("C", vec![]);
    let second = injector.get("C", vec![]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.downcast_ref::<&str>(), Some(&"cee"));
    assert!(same_value(&first, &second));
    assert!(injector.get_sync("C", vec![]).is_ok());
}
