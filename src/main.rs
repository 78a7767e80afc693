//! Maktaba Server - School Library Management System
//!
//! A Rust REST API server for an Islamic school library.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maktaba_server::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Dropping the guard stops the file writer
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Maktaba Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config);

    if let Some(admin) = services.users.bootstrap_admin().await? {
        tracing::info!(user_id = %admin.id, "administrator account ready");
    }

    spawn_overdue_sweep(
        services.borrowings.clone(),
        Duration::from_secs(config.borrowing.overdue_sweep_interval_secs.max(60)),
    );

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Console output (pretty or JSON) plus an optional daily-rotated file
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("maktaba_server={},tower_http=debug", config.level).into());

    let json = config.format.eq_ignore_ascii_case("json");
    let pretty_layer = (!json).then(|| tracing_subscriber::fmt::layer());
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "maktaba.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

/// Periodically mark past-due borrowings as overdue
fn spawn_overdue_sweep(borrowings: maktaba_server::services::borrowings::BorrowingsService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = borrowings.sweep_overdue().await {
                tracing::error!(error = %e, "overdue sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/login", post(api::auth::login))
        .route("/auth/register", post(api::auth::register))
        .route("/auth/me", get(api::auth::me))
        .route("/auth/profile", put(api::auth::update_my_profile))
        // Books
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route("/books/search", post(api::books::search_books))
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        // Categories
        .route(
            "/categories",
            get(api::categories::list_categories).post(api::categories::create_category),
        )
        .route(
            "/categories/:id",
            get(api::categories::get_category)
                .put(api::categories::update_category)
                .delete(api::categories::delete_category),
        )
        // Users
        .route("/users", get(api::users::list_users).post(api::users::create_user))
        .route(
            "/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::deactivate_user),
        )
        .route("/users/:id/role", put(api::users::update_role))
        .route("/users/:id/borrowings", get(api::borrowings::user_borrowings))
        // Borrowings
        .route(
            "/borrowings",
            get(api::borrowings::list_borrowings).post(api::borrowings::create_borrowing),
        )
        .route("/borrowings/me", get(api::borrowings::my_borrowings))
        .route("/borrowings/sweep-overdue", post(api::borrowings::sweep_overdue))
        .route("/borrowings/:id", get(api::borrowings::get_borrowing))
        .route("/borrowings/:id/return", post(api::borrowings::return_borrowing))
        .route("/borrowings/:id/renew", post(api::borrowings::renew_borrowing))
        .route("/borrowings/:id/pay", post(api::borrowings::pay_fine))
        // Preferences and bookmarks
        .route("/preferences", get(api::preferences::list_preferences))
        .route(
            "/preferences/:key",
            get(api::preferences::get_preference)
                .put(api::preferences::set_preference)
                .delete(api::preferences::delete_preference),
        )
        .route("/bookmarks", get(api::preferences::list_bookmarks))
        .route(
            "/bookmarks/:book_id",
            put(api::preferences::add_bookmark).delete(api::preferences::remove_bookmark),
        )
        // Settings
        .route(
            "/settings",
            get(api::settings::get_settings).put(api::settings::update_settings),
        )
        // Statistics
        .route("/stats", get(api::stats::get_stats))
        // Change feed
        .route("/events", get(api::events::stream_events))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
