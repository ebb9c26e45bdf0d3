mod api_doc;
mod auth;
mod cache;
mod config;
mod db;
mod notification;
mod review;
mod routes;
mod schema_ext;

use axum::{routing::get, Router};
use dotenv::dotenv;
use redis::Client;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::cache::redis::ProcessorLock;
use crate::config::AppConfig;
use crate::notification::delivery::SmtpChannel;
use crate::notification::preferences::PreferenceResolver;
use crate::notification::processor::NotificationProcessor;
use crate::notification::producer::EventProducer;
use crate::notification::render::ContentRenderer;
use crate::notification::store::PgNotificationStore;
use crate::review::service::{AuthorMailer, PgArticleStore, ReviewService};
use crate::routes::notifications::NotificationState;

const PORT_ATTEMPTS: u16 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    tracing_subscriber::fmt::init();

    // Load .env file if it exists
    dotenv().ok();

    let config = AppConfig::from_env()?;

    // Create connection pool
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // Check if the database is initialized
    if !db::check_db_initialized(&pool).await {
        db::init_db(&pool).await?;
    }

    let store = Arc::new(PgNotificationStore::new(pool.clone()));
    let preferences = PreferenceResolver::new(store.clone());
    let channel = Arc::new(SmtpChannel::new(&config.smtp)?);
    let renderer = ContentRenderer::new(config.base_url.clone());

    let mut processor = NotificationProcessor::new(
        store.clone(),
        preferences.clone(),
        store.clone(),
        renderer.clone(),
        channel.clone(),
        config.call_timeout,
    );

    // Serialise processor runs across instances if Redis is configured
    if let Some(url) = &config.redis_url {
        info!("Initializing processor lock with Redis URL: {}", url);
        match Client::open(url.as_str()) {
            Ok(client) => {
                let ttl = NotificationProcessor::max_run_time(config.call_timeout);
                processor = processor.with_lock(Arc::new(ProcessorLock::new(client, ttl)));
            }
            Err(e) => error!("Failed to connect to Redis: {}", e),
        }
    } else {
        info!("No Redis URL configured, processor runs without a lock");
    }
    let processor = Arc::new(processor);

    let producer = EventProducer::new(store.clone(), store.clone());

    let review_service = Arc::new(ReviewService::new(
        Arc::new(PgArticleStore::new(pool.clone())),
        producer.clone(),
        processor.clone(),
        AuthorMailer::new(store.clone(), renderer, channel),
        config.reviewer_emails.clone(),
    ));

    let notification_state = Arc::new(NotificationState {
        processor,
        preferences,
        producer,
        cron_secret: config.cron_secret.clone(),
    });

    // Build the router
    let app = Router::new()
        // API documentation
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::routes(pool.clone()))
        .merge(routes::notifications::routes(notification_state))
        .merge(routes::reviews::routes(review_service))
        .route("/", get(|| async { "Qalam notification service" }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    // Try the configured port, then the next few
    let mut port = config.port;
    for attempt in 1..=PORT_ATTEMPTS {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match axum::Server::try_bind(&addr) {
            Ok(server) => {
                println!(
                    "🚀 Server started successfully at http://localhost:{}",
                    port
                );
                println!("📄 API Documentation: http://localhost:{}/docs", port);
                println!(
                    "⏰ Scheduled trigger: http://localhost:{}/api/cron/notification-events",
                    port
                );
                return server
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| e.into());
            }
            Err(e) => {
                error!("Could not bind port {}: {}", port, e);
                if attempt == PORT_ATTEMPTS {
                    return Err("Failed to bind to any port".into());
                }
                port += 1;
            }
        }
    }

    Err("Failed to bind to any port".into())
}
