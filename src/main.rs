// src/main.rs

use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use titlehub::config::Config;
use titlehub::routes;
use titlehub::state::AppState;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Logging before configuration: `Config::from_env` warns about bad values.
    let file_appender = tracing_appender::rolling::daily("logs", "titlehub.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Load configuration from environment
    let config = Config::from_env();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    std::process::exit(1);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Failed to run database migrations: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_superuser(&pool, &config).await {
        tracing::error!("Failed to seed superuser: {:?}", e);
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config);
    let app = routes::create_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on {}", bind_addr);

    // The auth rate limiter keys on the peer address.
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}

/// Creates the superuser named by `ADMIN_USERNAME`/`ADMIN_EMAIL` if it does
/// not exist yet. The account signs in through the confirmation code flow.
async fn seed_superuser(pool: &PgPool, config: &Config) -> Result<(), sqlx::Error> {
    if let (Some(username), Some(email)) = (&config.admin_username, &config.admin_email) {
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (username, email, role, is_superuser, is_staff)
            VALUES ($1, $2, 'admin', TRUE, TRUE)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(username)
        .bind(email)
        .execute(pool)
        .await?;

        if inserted.rows_affected() > 0 {
            tracing::info!("Seeded superuser: {}", username);
        }
    }
    Ok(())
}
