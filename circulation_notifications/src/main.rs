use std::sync::Arc;

use actix_web::{App, HttpServer};
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use circulation_notifications::app_config::config_app;
use circulation_notifications::auth::CronSecret;
use circulation_notifications::push_gateway::{PushGatewayClient, PushTransport};
use circulation_notifications::subscriptions_repository::{
    InMemorySubscriptionsRepository, PostgresSubscriptionsRepository,
    PostgresSubscriptionsRepositoryConfig, SubscriptionsRepository,
};
use circulation_notifications::sweep::{DueLoanSource, LoansServiceDueSource};

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() {
    let app_name = "circulation_notifications";

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

    let port = settings.get_int("port").unwrap_or(8082) as u16;
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
    let loans_service_url = settings
        .get_string("loans_service_url")
        .unwrap_or("http://localhost:8081".to_string());
    let push_gateway_url = settings
        .get_string("push_gateway_url")
        .unwrap_or("http://localhost:8090".to_string());
    let cron_secret = CronSecret::new(settings.get_string("cron_secret").ok());

    let subscriptions_repository: Arc<dyn SubscriptionsRepository> = if use_in_memory_db {
        Arc::new(InMemorySubscriptionsRepository::default())
    } else {
        Arc::new(
            PostgresSubscriptionsRepository::init(PostgresSubscriptionsRepositoryConfig {
                hostname: pg_hostname,
                username: pg_username,
                password: pg_password,
            })
            .await
            .expect("Failed to init postgres"),
        )
    };

    let due_loans: Arc<dyn DueLoanSource> = Arc::new(
        LoansServiceDueSource::new(&loans_service_url).expect("Failed to create loans client"),
    );
    let transport: Arc<dyn PushTransport> = Arc::new(PushGatewayClient::new(push_gateway_url));

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(subscriptions_repository.clone()))
            .app_data(web::Data::new(due_loans.clone()))
            .app_data(web::Data::new(transport.clone()))
            .app_data(web::Data::new(cron_secret.clone()))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
