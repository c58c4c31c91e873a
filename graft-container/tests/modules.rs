//! Module graphs turned into injector hierarchies.

use graft_container::prelude::*;
use parking_lot::Mutex;

#[test]
fn public_provider_uses_private_dependencies_of_its_module() {
    let storage = Module::builder("storage")
        .provide(ProviderDescriptor::value("dsn", "pg://internal").private())
        .export_provider(
            ProviderDescriptor::class("repository", |args| {
                Ok(format!("repository over {}", args.get::<&str>(0)?))
            })
            .inject("dsn"),
        )
        .build();
    let app = Module::builder("app").import(&storage).build();
    let injector = Injector::from_module(&app).unwrap();

    let repository = injector.get_as::<String>("repository", vec![]).unwrap();
    assert_eq!(repository.as_str(), "repository over pg://internal");
    assert!(injector.get_sync("dsn", vec![]).unwrap_err().is_not_found());
}

#[test]
fn unexported_tokens_stay_inside_the_module() {
    let feature = Module::builder("feature")
        .provide(ProviderDescriptor::value("internal", ()))
        .build();
    let app = Module::builder("app").import(&feature).build();
    let injector = Injector::from_module(&app).unwrap();

    assert!(injector.get_sync("internal", vec![]).unwrap_err().is_not_found());
    assert!(injector.module(&feature).unwrap().get_sync("internal", vec![]).is_ok());
}

#[test]
fn eager_import_cycle_builds_each_module_once() {
    let forward = ForwardModule::new();
    let billing = Module::builder("billing")
        .import_forward(&forward)
        .export_provider(ProviderDescriptor::value("invoice", "inv-1"))
        .build();
    let accounts = Module::builder("accounts")
        .import(&billing)
        .export_provider(ProviderDescriptor::value("account", "acc-1"))
        .build();
    assert!(forward.set(&accounts));

    let injector = Injector::from_module(&accounts).unwrap();
    assert_eq!(*injector.get_as::<&str>("invoice", vec![]).unwrap(), "inv-1");

    let billing_injector = injector.module(&billing).unwrap();
    assert_eq!(injector.imports().len(), 1);
    assert_eq!(billing_injector.imports()[0].id(), injector.id());
    assert_eq!(*billing_injector.get_as::<&str>("account", vec![]).unwrap(), "acc-1");
}

#[test]
fn unset_forward_import_fails_the_build() {
    let forward = ForwardModule::new();
    let app = Module::builder("app").import_forward(&forward).build();

    let error = Injector::from_module(&app).unwrap_err();
    assert!(matches!(error, GraftError::UnsetForwardImport { module } if module == "app"));
}

#[test]
fn module_re_export_is_one_hop() {
    let core = Module::builder("core")
        .export_provider(ProviderDescriptor::value("clock", "utc"))
        .build();
    let util = Module::builder("util")
        .import(&core)
        .export_provider(ProviderDescriptor::value("format", "iso"))
        .build();
    let shared = Module::builder("shared").import(&util).export_module(&util).build();
    let app = Module::builder("app").import(&shared).build();
    let injector = Injector::from_module(&app).unwrap();

    assert_eq!(*injector.get_as::<&str>("format", vec![]).unwrap(), "iso");
    assert!(injector.get_sync("clock", vec![]).unwrap_err().is_not_found());
}

#[test]
fn re_exported_token_passes_through() {
    let db = Module::builder("db")
        .export_provider(ProviderDescriptor::value("pool", "pool-1"))
        .build();
    let infra = Module::builder("infra").import(&db).export("pool").build();
    let app = Module::builder("app").import(&infra).build();
    let injector = Injector::from_module(&app).unwrap();

    assert_eq!(*injector.get_as::<&str>("pool", vec![]).unwrap(), "pool-1");
    let inspection = injector.inspect("pool", vec![]).unwrap();
    assert_eq!(inspection.injector.unwrap().name(), "infra");
}

#[test]
fn extended_module_inherits_base_metadata() {
    let base = Module::builder("base")
        .export_provider(ProviderDescriptor::value("greeting", "hello"))
        .export_provider(ProviderDescriptor::value("target", "world"))
        .build();
    let localized = Module::builder("localized")
        .extends(&base)
        .export_provider(ProviderDescriptor::value("greeting", "bonjour"))
        .build();
    let app = Module::builder("app").import(&localized).build();
    let injector = Injector::from_module(&app).unwrap();

    assert_eq!(*injector.get_as::<&str>("greeting", vec![]).unwrap(), "bonjour");
    assert_eq!(*injector.get_as::<&str>("target", vec![]).unwrap(), "world");
}

#[test]
fn building_emits_module_events() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let bus_plugin = move |bus: &EventBus| {
        let recorder = recorder.clone();
        bus.subscribe(move |event| {
            if let LifecycleEvent::ModuleAdded { module, .. } = event {
                recorder.lock().push(module.clone());
            }
        });
    };

    struct Modules<F>(F);
    impl<F: Fn(&EventBus) + Send + Sync> Plugin for Modules<F> {
        fn install(&self, bus: &EventBus) {
            (self.0)(bus)
        }
    }

    let leaf = Module::builder("leaf").build();
    let app = Module::builder("app").import(&leaf).build();
    let injector = Injector::builder()
        .plugin(Modules(bus_plugin))
        .module(app)
        .build()
        .unwrap();

    assert_eq!(*seen.lock(), vec!["leaf".to_string(), "app".to_string()]);
    assert_eq!(injector.snapshot().children[0].name, "leaf");
}

#[test]
fn snapshot_serializes_the_hierarchy() {
    let db = Module::builder("db")
        .export_provider(ProviderDescriptor::value("pool", ()))
        .build();
    let app = Module::builder("app").import(&db).build();
    let injector = Injector::from_module(&app).unwrap();

    let json = serde_json::to_value(injector.snapshot()).unwrap();
    assert_eq!(json["name"], "app");
    assert_eq!(json["imports"][0], "db");
    assert_eq!(json["children"][0]["exports"][0], "pool");
    assert_eq!(json["children"][0]["providers"][0]["recipe"], "value");
}
