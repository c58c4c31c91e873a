//! Basic example of the Graft injector.

use graft::prelude::*;

// === Define your types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<Box<dyn Logger>>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("graft_container=debug").init();

    // Infrastructure lives in its own module; only the database is exported.
    let infra = Module::builder("infra")
        .provide(
            ProviderDescriptor::value(
                Token::of::<Config>(),
                Config {
                    database_url: "postgres://localhost/myapp".to_string(),
                },
            )
            .private(),
        )
        .provide(ProviderDescriptor::value("logger", Box::new(ConsoleLogger) as Box<dyn Logger>))
        .export_provider(
            ProviderDescriptor::class(Token::of::<Database>(), |args| {
                let config = args.get::<Config>(0)?;
                Ok(Database {
                    url: config.database_url.clone(),
                    logger: args.get(1)?,
                })
            })
            .inject(Token::of::<Config>())
            .inject("logger")
            .scope(Scope::Singleton)
            .on_destroy(OnDestroy::typed(|db: &Database| {
                println!("closing {}", db.url);
                Ok(())
            })),
        )
        .build();

    let app = Module::builder("app")
        .import(&infra)
        .provide(
            ProviderDescriptor::class(Token::of::<UserRepository>(), |args| Ok(UserRepository { db: args.get(0)? }))
                .inject(Token::of::<Database>()),
        )
        .build();

    let injector = Injector::builder().name("app").module(app).build()?;
    println!("{:#?}", injector.snapshot());

    // A child injector per request reuses the application singletons.
    let request = injector.child("request");
    let repository = request.resolve::<UserRepository>()?;
    println!("{}", repository.find_user(42));

    let missing = injector.get_optional::<Config>(Token::of::<Config>())?;
    println!("config visible from app: {}", missing.is_some());

    // No teardown here is asynchronous, so destroy settles immediately.
    injector.destroy().into_ready().unwrap_or(Ok(()))
}
