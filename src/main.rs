use std::sync::Arc;

use anyhow::Context;
use paywall_billing::config::Config;
use paywall_billing::db::{
    postgres_payment_repository::PostgresPaymentRepository,
    postgres_subscription_repository::PostgresSubscriptionRepository,
    postgres_user_repository::PostgresUserRepository,
    postgres_webhook_event_log_repository::PostgresWebhookEventLogRepository,
};
use paywall_billing::routes;
use paywall_billing::services::accounting::{
    AccountingForwarder, HttpAccountingForwarder, NoopAccountingForwarder,
};
use paywall_billing::services::crypto::LiveCryptoService;
use paywall_billing::services::stripe::LiveStripeService;
use paywall_billing::AppState;
use reqwest::Client;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_tracing(config.json_logs);

    let pg_pool = establish_connection(&config.database_url).await?;
    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pg_pool)
            .await
            .context("failed to run database migrations")?;
        info!("database migrations applied");
    }

    let http_client = Client::new();
    let accounting: Arc<dyn AccountingForwarder> = match &config.accounting {
        Some(settings) => Arc::new(HttpAccountingForwarder::new(
            http_client.clone(),
            settings.webhook_url.clone(),
            settings.api_key.clone(),
        )),
        None => {
            info!("ACCOUNTING_WEBHOOK_URL not set; accounting forwarding disabled");
            Arc::new(NoopAccountingForwarder)
        }
    };

    let state = AppState {
        payments: Arc::new(PostgresPaymentRepository {
            pool: pg_pool.clone(),
        }),
        subscriptions: Arc::new(PostgresSubscriptionRepository {
            pool: pg_pool.clone(),
        }),
        users: Arc::new(PostgresUserRepository {
            pool: pg_pool.clone(),
        }),
        event_log: Arc::new(PostgresWebhookEventLogRepository {
            pool: pg_pool.clone(),
        }),
        stripe: Arc::new(LiveStripeService::from_settings(&config.stripe)),
        crypto: Arc::new(LiveCryptoService::from_settings(&http_client, &config.crypto)),
        accounting,
        config: Arc::new(config.clone()),
    };

    let app = routes::router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "paywall billing listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(sentry_tracing::layer());
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("connected to the database");
    Ok(pool)
}
