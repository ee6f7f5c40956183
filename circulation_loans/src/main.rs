use std::sync::Arc;

use actix_web::{App, HttpServer};
use chrono::FixedOffset;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use circulation_loans::app_config::config_app;
use circulation_loans::auth::AdminList;
use circulation_loans::book_lookup::CatalogBookChecker;
use circulation_loans::eligibility::LoanRules;
use circulation_loans::loans_repository::{
    InMemoryLoansRepository, LoansRepository, PostgresLoansRepository,
    PostgresLoansRepositoryConfig,
};

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() {
    let app_name = "circulation_loans";

    // Start a new Jaeger trace pipeline.
    // Spans are exported in batch - recommended setup for a production application.
    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .expect("Failed to install OpenTelemetry tracer.");

    // Filter based on level - trace, debug, info, warn, error
    // Tunable via `RUST_LOG` env variable
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    // Create a `tracing` layer using the Jaeger tracer
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    // Create a `tracing` layer to emit spans as structured logs to stdout
    let formatting_layer = BunyanFormattingLayer::new(app_name.into(), std::io::stdout);
    // Combined them all together in a `tracing` subscriber
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to install `tracing` subscriber.")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    let settings = config::Config::builder()
        .add_source(config::Environment::default())
        .build()
        .expect("Failed to read environment configuration");

    let port = settings.get_int("port").unwrap_or(8081) as u16;
    println!("starting HTTP server at http://localhost:{port}");

    let use_in_memory_db = settings.get_bool("use_in_memory_db").unwrap_or(false);
    let pg_hostname = settings
        .get_string("db_host")
        .unwrap_or("127.0.0.1".to_string());
    let pg_username = settings
        .get_string("db_username")
        .unwrap_or("postgres".to_string());
    let pg_password = settings
        .get_string("db_password")
        .unwrap_or("postgres".to_string());
    let catalog_service_url = settings
        .get_string("catalog_service_url")
        .unwrap_or("http://localhost:8080".to_string());
    let admin_emails = settings.get_string("admin_emails").unwrap_or_default();
    let weekday_offset_hours = settings.get_int("weekday_utc_offset_hours").unwrap_or(9) as i32;

    let loans_repository: Arc<dyn LoansRepository> = if use_in_memory_db {
        Arc::new(InMemoryLoansRepository::default())
    } else {
        Arc::new(
            PostgresLoansRepository::init(PostgresLoansRepositoryConfig {
                hostname: pg_hostname,
                username: pg_username,
                password: pg_password,
            })
            .await
            .expect("Failed to init postgres"),
        )
    };

    let admins = AdminList::from_comma_separated(&admin_emails);
    let rules = LoanRules {
        weekday_offset: FixedOffset::east_opt(weekday_offset_hours * 3600)
            .expect("WEEKDAY_UTC_OFFSET_HOURS out of range"),
    };

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(loans_repository.clone()))
            .app_data(web::Data::new(CatalogBookChecker::new(
                catalog_service_url.clone(),
            )))
            .app_data(web::Data::new(admins.clone()))
            .app_data(web::Data::new(rules))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
