//! # Graft: Hierarchical Dependency Injection for Rust
//!
//! Providers are declared on injectors or grouped into modules; requests
//! run through hooks, resolve through parent and import edges, are cached
//! per scope and torn down in dependency order.
//!
//! ```
//! use graft::prelude::*;
//!
//! struct Greeter {
//!     greeting: Arc<&'static str>,
//! }
//!
//! let injector = Injector::builder()
//!     .provider(ProviderDescriptor::value("greeting", "hello"))
//!     .provider(
//!         ProviderDescriptor::class(Token::of::<Greeter>(), |args| {
//!             Ok(Greeter { greeting: args.get(0)? })
//!         })
//!         .inject("greeting"),
//!     )
//!     .build()?;
//!
//! let greeter = injector.resolve::<Greeter>()?;
//! assert_eq!(*greeter.greeting, "hello");
//! # Ok::<(), graft::GraftError>(())
//! ```

pub use graft_container::*;
pub use graft_support as support;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_builds_a_module_hierarchy() {
        let config = Module::builder("config")
            .export_provider(ProviderDescriptor::value("port", 8080u16))
            .build();
        let app = Module::builder("app").import(&config).build();

        let injector = Injector::from_module(&app).unwrap();
        assert_eq!(*injector.get_as::<u16>("port", vec![]).unwrap(), 8080);
        assert!(injector.destroy().into_ready().unwrap().is_ok());
    }
}
